//! Catalog and stock models.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::value_objects::{Money, ProductId, SkuId};

/// A catalog product. Read-only for the saga participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub main_picture: String,
    pub is_enable: bool,
    pub is_deleted: bool,
}

impl Product {
    /// Returns true if the product can be put into a cart.
    pub fn is_orderable(&self) -> bool {
        self.is_enable && !self.is_deleted
    }
}

/// Stock row for a single SKU.
///
/// `quantity_available` never goes below zero; it is only changed by the
/// conditional decrement and the compensating increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub sku_id: SkuId,
    pub product_id: ProductId,
    pub name: String,
    pub sell_price: Money,
    pub quantity_available: i64,
}

impl StockRecord {
    /// Returns true if `quantity` units could be reserved right now.
    ///
    /// Only a hint for fail-fast checks; the reservation itself is decided by
    /// the store's atomic conditional update.
    pub fn can_reserve(&self, quantity: u32) -> bool {
        self.quantity_available >= i64::from(quantity)
    }
}

/// Validates a requested quantity and narrows it to `u32`.
pub fn validate_quantity(quantity: i64) -> Result<u32> {
    if quantity < 1 {
        return Err(DomainError::InvalidQuantity(quantity));
    }
    u32::try_from(quantity).map_err(|_| DomainError::InvalidQuantity(quantity))
}
