use common::Gid;
use domain::{ProductId, SkuId};
use serde::{Deserialize, Serialize};

use super::ShopWorkflows;
use crate::error::Result;
use crate::services::{
    CreateCartLine, StockAdjustment, CREATE_CART_LINE, RELEASE_STOCK, REMOVE_CART_LINE,
    RESERVE_STOCK,
};
use crate::step::Saga;
use crate::submitter::SagaReport;

/// Client request to put `number` units of a sku into the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub number: i64,
}

impl ShopWorkflows {
    /// Reserves stock, then creates the cart line.
    #[tracing::instrument(skip(self, token), fields(product_id = %req.product_id, sku_id = %req.sku_id))]
    pub async fn add_to_cart(&self, token: &str, req: &AddToCartRequest) -> Result<SagaReport> {
        let user_id = self.gate.authenticate(token).await?;
        let plan = self
            .gate
            .check_add_to_cart(user_id, req.product_id, req.sku_id, req.number)
            .await?;

        let reserve = StockAdjustment {
            sku_id: plan.sku.sku_id,
            quantity: plan.quantity,
        };
        let create = CreateCartLine {
            user_id,
            product_id: plan.product.id,
            sku_id: plan.sku.sku_id,
            product_name: plan.product.name.clone(),
            product_main_picture: plan.product.main_picture.clone(),
            quantity: plan.quantity,
        };

        let saga = Saga::builder(Gid::new())
            .add(
                "reserve_stock",
                self.endpoints.url(RESERVE_STOCK),
                self.endpoints.url(RELEASE_STOCK),
                &reserve,
            )?
            .add(
                "create_cart_line",
                self.endpoints.url(CREATE_CART_LINE),
                self.endpoints.url(REMOVE_CART_LINE),
                &create,
            )?
            .build()?;

        tracing::info!(gid = %saga.gid(), %user_id, quantity = plan.quantity, "submitting add-to-cart saga");
        self.submitter.submit(saga).await
    }
}
