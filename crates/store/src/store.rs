use std::time::Duration;

use async_trait::async_trait;
use common::BranchKey;
use domain::{
    CartLine, CartLineId, NewCartLine, NewTradeOrder, OrderId, Product, ProductId, SkuId,
    StockRecord, TradeOrder,
};

use crate::Result;
use crate::barrier::{BarrierStatus, InsertOutcome};

/// Result of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The quantity was taken; `remaining` is the stock left afterwards.
    Applied { remaining: i64 },
    /// The row exists but holds fewer units than requested.
    Insufficient { available: i64 },
    /// No stock row exists for the sku.
    UnknownSku,
}

/// Read-only access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;
}

/// Per-sku stock counters.
///
/// Implementations must make `try_decrement` a single atomic
/// check-and-decrement so that concurrent reservations can never drive the
/// stock below zero.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Looks up the stock row of a sku.
    async fn get_sku(&self, sku_id: SkuId) -> Result<Option<StockRecord>>;

    /// Takes `quantity` units if at least that many are available.
    async fn try_decrement(&self, sku_id: SkuId, quantity: u32) -> Result<Decrement>;

    /// Puts `quantity` units back and returns the new stock.
    ///
    /// Fails with `NotFound` if the sku does not exist.
    async fn increment(&self, sku_id: SkuId, quantity: u32) -> Result<i64>;
}

/// Shopping-cart lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Inserts a new line.
    ///
    /// Fails with `Duplicate` if a line with the same correlation key exists.
    async fn insert_line(&self, line: NewCartLine) -> Result<CartLine>;

    async fn get_line(&self, id: CartLineId) -> Result<Option<CartLine>>;

    async fn find_line_by_correlation(&self, correlation_key: &str) -> Result<Option<CartLine>>;

    /// Flips `is_deleted` to true on the line created under `correlation_key`.
    ///
    /// Returns false if no active line carries the key.
    async fn retire_line_by_correlation(&self, correlation_key: &str) -> Result<bool>;

    /// Flips `is_deleted` from false to true. Returns false if the line is
    /// missing or already retired.
    async fn retire_line(&self, id: CartLineId) -> Result<bool>;

    /// Flips `is_deleted` from true to false. Returns false if the line is
    /// missing or already active.
    async fn restore_line(&self, id: CartLineId) -> Result<bool>;
}

/// Trade orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with `Duplicate` if an order with the same correlation key or
    /// order number exists.
    async fn insert_order(&self, order: NewTradeOrder) -> Result<TradeOrder>;

    async fn get_order(&self, id: OrderId) -> Result<Option<TradeOrder>>;

    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<TradeOrder>>;

    async fn find_order_by_correlation(&self, correlation_key: &str) -> Result<Option<TradeOrder>>;

    /// Flips `is_deleted` to true on the order created under `correlation_key`.
    ///
    /// Returns false if no active order carries the key.
    async fn retire_order_by_correlation(&self, correlation_key: &str) -> Result<bool>;
}

/// Branch barrier markers, one per (gid, branch, op).
#[async_trait]
pub trait BarrierStore: Send + Sync {
    /// Inserts a marker with `status` unless one already exists for `key`.
    ///
    /// The insert and the existence check must be a single atomic operation.
    async fn try_insert(&self, key: &BranchKey, status: BarrierStatus) -> Result<InsertOutcome>;

    /// Moves a pending marker to applied.
    async fn mark_applied(&self, key: &BranchKey) -> Result<()>;

    /// Removes a pending marker. Markers in other states are left untouched.
    async fn remove_pending(&self, key: &BranchKey) -> Result<()>;

    /// Returns the current marker for `key`, if any.
    async fn status(&self, key: &BranchKey) -> Result<Option<BarrierStatus>>;
}

/// Shared session cache written by the login service.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Returns the session token stored under `key`.
    async fn get_session(&self, key: &str) -> Result<Option<String>>;

    /// Extends the expiry of the session stored under `key`.
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()>;
}
