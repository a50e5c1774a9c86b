use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::BranchKey;
use domain::{
    CartLine, CartLineId, NewCartLine, NewTradeOrder, OrderId, Product, ProductId, SkuId,
    StockRecord, TradeOrder,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    barrier::{BarrierStatus, InsertOutcome},
    store::{BarrierStore, CartStore, Decrement, OrderStore, ProductCatalog, StockStore},
};

struct Rows<T> {
    next_id: i64,
    by_id: HashMap<i64, T>,
}

impl<T> Default for Rows<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            by_id: HashMap::new(),
        }
    }
}

impl<T> Rows<T> {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of every participant store.
///
/// Used for tests and single-node development runs. Each table sits behind
/// its own lock; the stock decrement runs entirely under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    stock: Arc<RwLock<HashMap<SkuId, StockRecord>>>,
    carts: Arc<RwLock<Rows<CartLine>>>,
    orders: Arc<RwLock<Rows<TradeOrder>>>,
    barrier: Arc<RwLock<HashMap<BranchKey, BarrierStatus>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog product.
    pub async fn seed_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    /// Adds or replaces a stock row.
    pub async fn seed_sku(&self, record: StockRecord) {
        self.stock.write().await.insert(record.sku_id, record);
    }

    /// Returns the current stock of a sku.
    pub async fn stock_of(&self, sku_id: SkuId) -> Option<i64> {
        self.stock
            .read()
            .await
            .get(&sku_id)
            .map(|r| r.quantity_available)
    }

    /// Returns the number of cart lines ever created, retired ones included.
    pub async fn cart_line_count(&self) -> usize {
        self.carts.read().await.by_id.len()
    }

    /// Returns the number of active cart lines.
    pub async fn active_cart_line_count(&self) -> usize {
        self.carts
            .read()
            .await
            .by_id
            .values()
            .filter(|l| l.is_active())
            .count()
    }

    /// Returns the number of trade orders ever created.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.by_id.len()
    }

    /// Returns the number of active trade orders.
    pub async fn active_order_count(&self) -> usize {
        self.orders
            .read()
            .await
            .by_id
            .values()
            .filter(|o| o.is_active())
            .count()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl StockStore for InMemoryStore {
    async fn get_sku(&self, sku_id: SkuId) -> Result<Option<StockRecord>> {
        Ok(self.stock.read().await.get(&sku_id).cloned())
    }

    async fn try_decrement(&self, sku_id: SkuId, quantity: u32) -> Result<Decrement> {
        let mut stock = self.stock.write().await;
        let Some(record) = stock.get_mut(&sku_id) else {
            return Ok(Decrement::UnknownSku);
        };

        let quantity = i64::from(quantity);
        if record.quantity_available < quantity {
            return Ok(Decrement::Insufficient {
                available: record.quantity_available,
            });
        }

        record.quantity_available -= quantity;
        Ok(Decrement::Applied {
            remaining: record.quantity_available,
        })
    }

    async fn increment(&self, sku_id: SkuId, quantity: u32) -> Result<i64> {
        let mut stock = self.stock.write().await;
        let record = stock
            .get_mut(&sku_id)
            .ok_or_else(|| StoreError::NotFound(format!("sku {sku_id}")))?;
        record.quantity_available += i64::from(quantity);
        Ok(record.quantity_available)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn insert_line(&self, line: NewCartLine) -> Result<CartLine> {
        let mut carts = self.carts.write().await;
        if carts
            .by_id
            .values()
            .any(|l| l.correlation_key == line.correlation_key)
        {
            return Err(StoreError::Duplicate(format!(
                "cart line {}",
                line.correlation_key
            )));
        }

        let id = carts.allocate();
        let line = line.into_line(CartLineId::new(id), Utc::now());
        carts.by_id.insert(id, line.clone());
        Ok(line)
    }

    async fn get_line(&self, id: CartLineId) -> Result<Option<CartLine>> {
        Ok(self.carts.read().await.by_id.get(&id.as_i64()).cloned())
    }

    async fn find_line_by_correlation(&self, correlation_key: &str) -> Result<Option<CartLine>> {
        Ok(self
            .carts
            .read()
            .await
            .by_id
            .values()
            .find(|l| l.correlation_key == correlation_key)
            .cloned())
    }

    async fn retire_line_by_correlation(&self, correlation_key: &str) -> Result<bool> {
        let mut carts = self.carts.write().await;
        let line = carts
            .by_id
            .values_mut()
            .find(|l| l.correlation_key == correlation_key && !l.is_deleted);
        Ok(match line {
            Some(line) => {
                line.is_deleted = true;
                line.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn retire_line(&self, id: CartLineId) -> Result<bool> {
        set_line_deleted(&self.carts, id, true).await
    }

    async fn restore_line(&self, id: CartLineId) -> Result<bool> {
        set_line_deleted(&self.carts, id, false).await
    }
}

async fn set_line_deleted(
    carts: &RwLock<Rows<CartLine>>,
    id: CartLineId,
    deleted: bool,
) -> Result<bool> {
    let mut carts = carts.write().await;
    match carts.by_id.get_mut(&id.as_i64()) {
        Some(line) if line.is_deleted != deleted => {
            line.is_deleted = deleted;
            line.updated_at = Utc::now();
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: NewTradeOrder) -> Result<TradeOrder> {
        let mut orders = self.orders.write().await;
        if orders.by_id.values().any(|o| {
            o.correlation_key == order.correlation_key || o.order_no == order.order_no
        }) {
            return Err(StoreError::Duplicate(format!(
                "trade order {}",
                order.correlation_key
            )));
        }

        let id = orders.allocate();
        let order = order.into_order(OrderId::new(id), Utc::now());
        orders.by_id.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<TradeOrder>> {
        Ok(self.orders.read().await.by_id.get(&id.as_i64()).cloned())
    }

    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<TradeOrder>> {
        Ok(self
            .orders
            .read()
            .await
            .by_id
            .values()
            .find(|o| o.order_no == order_no)
            .cloned())
    }

    async fn find_order_by_correlation(&self, correlation_key: &str) -> Result<Option<TradeOrder>> {
        Ok(self
            .orders
            .read()
            .await
            .by_id
            .values()
            .find(|o| o.correlation_key == correlation_key)
            .cloned())
    }

    async fn retire_order_by_correlation(&self, correlation_key: &str) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let order = orders
            .by_id
            .values_mut()
            .find(|o| o.correlation_key == correlation_key && !o.is_deleted);
        Ok(match order {
            Some(order) => {
                order.is_deleted = true;
                order.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl BarrierStore for InMemoryStore {
    async fn try_insert(&self, key: &BranchKey, status: BarrierStatus) -> Result<InsertOutcome> {
        let mut barrier = self.barrier.write().await;
        if let Some(existing) = barrier.get(key) {
            return Ok(InsertOutcome::Existing(*existing));
        }
        barrier.insert(key.clone(), status);
        Ok(InsertOutcome::Inserted)
    }

    async fn mark_applied(&self, key: &BranchKey) -> Result<()> {
        let mut barrier = self.barrier.write().await;
        match barrier.get_mut(key) {
            Some(status) => {
                *status = BarrierStatus::Applied;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("barrier {key}"))),
        }
    }

    async fn remove_pending(&self, key: &BranchKey) -> Result<()> {
        let mut barrier = self.barrier.write().await;
        if barrier.get(key) == Some(&BarrierStatus::Pending) {
            barrier.remove(key);
        }
        Ok(())
    }

    async fn status(&self, key: &BranchKey) -> Result<Option<BarrierStatus>> {
        Ok(self.barrier.read().await.get(key).copied())
    }
}
