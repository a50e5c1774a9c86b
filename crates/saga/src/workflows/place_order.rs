use common::Gid;
use domain::CartLineId;
use serde::{Deserialize, Serialize};

use super::ShopWorkflows;
use crate::error::Result;
use crate::services::{
    CartLineRef, CreateTradeOrder, CREATE_TRADE_ORDER, REMOVE_TRADE_ORDER, RESTORE_CART_LINE,
    RETIRE_CART_LINE,
};
use crate::step::Saga;
use crate::submitter::SagaReport;

/// Client request to turn cart lines into a trade order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub cart_ids: Vec<CartLineId>,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub recipient_address_id: i64,
}

impl ShopWorkflows {
    /// Retires each cart line, then creates the order.
    #[tracing::instrument(skip(self, token), fields(lines = req.cart_ids.len()))]
    pub async fn place_order(&self, token: &str, req: &PlaceOrderRequest) -> Result<SagaReport> {
        let user_id = self.gate.authenticate(token).await?;
        let plan = self.gate.check_place_order(user_id, &req.cart_ids).await?;

        let mut builder = Saga::builder(Gid::new());
        for line in &plan.lines {
            builder = builder.add(
                "retire_cart_line",
                self.endpoints.url(RETIRE_CART_LINE),
                self.endpoints.url(RESTORE_CART_LINE),
                &CartLineRef { cart_id: line.id },
            )?;
        }

        let order = CreateTradeOrder {
            user_id,
            total_amount: plan.total,
            cart_ids: plan.lines.iter().map(|line| line.id).collect(),
            is_virtual: req.is_virtual,
            recipient_address_id: req.recipient_address_id,
        };
        let saga = builder
            .add(
                "create_trade_order",
                self.endpoints.url(CREATE_TRADE_ORDER),
                self.endpoints.url(REMOVE_TRADE_ORDER),
                &order,
            )?
            .build()?;

        tracing::info!(gid = %saga.gid(), %user_id, total = %plan.total, "submitting place-order saga");
        self.submitter.submit(saga).await
    }
}
