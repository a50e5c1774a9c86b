//! Shopping-cart line model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{CartLineId, Money, ProductId, SkuId, UserId};

/// One product/sku line in a user's cart.
///
/// Lines are never physically deleted: compensation and order placement flip
/// `is_deleted`, which keeps every transition repeatable and auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub product_name: String,
    pub product_main_picture: String,
    pub quantity: u32,
    pub is_deleted: bool,
    /// `gid:branch` of the saga step that created the line.
    pub correlation_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Returns true if the line can still be turned into an order.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Returns the line total at the given unit price.
    pub fn total_at(&self, unit_price: Money) -> Money {
        unit_price.multiply(self.quantity)
    }
}

/// Fields of a cart line about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub product_name: String,
    pub product_main_picture: String,
    pub quantity: u32,
    pub correlation_key: String,
}

impl NewCartLine {
    /// Materializes the line with its store-assigned id.
    pub fn into_line(self, id: CartLineId, now: DateTime<Utc>) -> CartLine {
        CartLine {
            id,
            user_id: self.user_id,
            product_id: self.product_id,
            sku_id: self.sku_id,
            product_name: self.product_name,
            product_main_picture: self.product_main_picture,
            quantity: self.quantity,
            is_deleted: false,
            correlation_key: self.correlation_key,
            created_at: now,
            updated_at: now,
        }
    }
}
