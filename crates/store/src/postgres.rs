use async_trait::async_trait;
use common::BranchKey;
use domain::{
    CartLine, CartLineId, Money, NewCartLine, NewTradeOrder, OrderId, OrderStatus, Product,
    ProductId, SkuId, StockRecord, TradeOrder, UserId,
};
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    Result, StoreError,
    barrier::{BarrierStatus, InsertOutcome},
    store::{BarrierStore, CartStore, Decrement, OrderStore, ProductCatalog, StockStore},
};

const CART_COLUMNS: &str = "id, user_id, product_id, sku_id, product_name, product_main_picture, \
     quantity, is_deleted, correlation_key, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_no, user_id, total_amount, order_status, cart_ids, \
     is_virtual, recipient_address_id, is_deleted, correlation_key, submit_time, expire_time, \
     created_at, updated_at";

/// PostgreSQL-backed implementation of every participant store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_line(row: PgRow) -> Result<CartLine> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(CartLine {
            id: CartLineId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            sku_id: SkuId::new(row.try_get("sku_id")?),
            product_name: row.try_get("product_name")?,
            product_main_picture: row.try_get("product_main_picture")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("cart quantity {quantity}")))?,
            is_deleted: row.try_get("is_deleted")?,
            correlation_key: row.try_get("correlation_key")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<TradeOrder> {
        let status: i16 = row.try_get("order_status")?;
        let cart_ids: Vec<i64> = row.try_get("cart_ids")?;
        Ok(TradeOrder {
            id: OrderId::new(row.try_get("id")?),
            order_no: row.try_get("order_no")?,
            user_id: UserId::new(row.try_get("user_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            order_status: OrderStatus::from_code(status)
                .ok_or_else(|| StoreError::Corrupt(format!("order status {status}")))?,
            cart_ids: cart_ids.into_iter().map(CartLineId::new).collect(),
            is_virtual: row.try_get("is_virtual")?,
            recipient_address_id: row.try_get("recipient_address_id")?,
            is_deleted: row.try_get("is_deleted")?,
            correlation_key: row.try_get("correlation_key")?,
            submit_time: row.try_get("submit_time")?,
            expire_time: row.try_get("expire_time")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_status(row: PgRow) -> Result<BarrierStatus> {
        let status: String = row.try_get("status")?;
        BarrierStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("barrier status {status}")))
    }
}

/// Maps a unique-constraint violation to `StoreError::Duplicate`.
fn map_unique_violation(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate(what.to_string());
    }
    StoreError::Database(e)
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, main_picture, is_enable, is_deleted FROM product WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Product> {
            Ok(Product {
                id: ProductId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                main_picture: row.try_get("main_picture")?,
                is_enable: row.try_get("is_enable")?,
                is_deleted: row.try_get("is_deleted")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl StockStore for PostgresStore {
    async fn get_sku(&self, sku_id: SkuId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(
            "SELECT id, product_id, name, sell_price, stock FROM product_sku WHERE id = $1",
        )
        .bind(sku_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StockRecord> {
            Ok(StockRecord {
                sku_id: SkuId::new(row.try_get("id")?),
                product_id: ProductId::new(row.try_get("product_id")?),
                name: row.try_get("name")?,
                sell_price: Money::from_cents(row.try_get("sell_price")?),
                quantity_available: row.try_get("stock")?,
            })
        })
        .transpose()
    }

    async fn try_decrement(&self, sku_id: SkuId, quantity: u32) -> Result<Decrement> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE product_sku SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(sku_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(Decrement::Applied { remaining });
        }

        // Zero rows: report why. The value is informational only.
        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM product_sku WHERE id = $1")
                .bind(sku_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        Ok(match available {
            Some(available) => Decrement::Insufficient { available },
            None => Decrement::UnknownSku,
        })
    }

    async fn increment(&self, sku_id: SkuId, quantity: u32) -> Result<i64> {
        let stock: Option<i64> = sqlx::query_scalar(
            "UPDATE product_sku SET stock = stock + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(sku_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        stock.ok_or_else(|| StoreError::NotFound(format!("sku {sku_id}")))
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn insert_line(&self, line: NewCartLine) -> Result<CartLine> {
        let sql = format!(
            r#"
            INSERT INTO shopping_cart
                (user_id, product_id, sku_id, product_name, product_main_picture, quantity, correlation_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CART_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(line.user_id.as_i64())
            .bind(line.product_id.as_i64())
            .bind(line.sku_id.as_i64())
            .bind(&line.product_name)
            .bind(&line.product_main_picture)
            .bind(i64::from(line.quantity))
            .bind(&line.correlation_key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, &format!("cart line {}", line.correlation_key)))?;

        Self::row_to_line(row)
    }

    async fn get_line(&self, id: CartLineId) -> Result<Option<CartLine>> {
        let sql = format!("SELECT {CART_COLUMNS} FROM shopping_cart WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_line).transpose()
    }

    async fn find_line_by_correlation(&self, correlation_key: &str) -> Result<Option<CartLine>> {
        let sql = format!("SELECT {CART_COLUMNS} FROM shopping_cart WHERE correlation_key = $1");
        let row = sqlx::query(&sql)
            .bind(correlation_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_line).transpose()
    }

    async fn retire_line_by_correlation(&self, correlation_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_cart SET is_deleted = TRUE, updated_at = NOW()
            WHERE correlation_key = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn retire_line(&self, id: CartLineId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_cart SET is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_line(&self, id: CartLineId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shopping_cart SET is_deleted = FALSE, updated_at = NOW()
            WHERE id = $1 AND is_deleted = TRUE
            "#,
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: NewTradeOrder) -> Result<TradeOrder> {
        let cart_ids: Vec<i64> = order.cart_ids.iter().map(|id| id.as_i64()).collect();
        let sql = format!(
            r#"
            INSERT INTO trade_order
                (order_no, user_id, total_amount, order_status, cart_ids, is_virtual,
                 recipient_address_id, correlation_key, submit_time, expire_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&order.order_no)
            .bind(order.user_id.as_i64())
            .bind(order.total_amount.cents())
            .bind(order.order_status.code())
            .bind(&cart_ids)
            .bind(order.is_virtual)
            .bind(order.recipient_address_id)
            .bind(&order.correlation_key)
            .bind(order.submit_time)
            .bind(order.expire_time)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, &format!("trade order {}", order.correlation_key))
            })?;

        Self::row_to_order(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<TradeOrder>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM trade_order WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_no(&self, order_no: &str) -> Result<Option<TradeOrder>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM trade_order WHERE order_no = $1");
        let row = sqlx::query(&sql)
            .bind(order_no)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_correlation(&self, correlation_key: &str) -> Result<Option<TradeOrder>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM trade_order WHERE correlation_key = $1");
        let row = sqlx::query(&sql)
            .bind(correlation_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn retire_order_by_correlation(&self, correlation_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trade_order SET is_deleted = TRUE, updated_at = NOW()
            WHERE correlation_key = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl BarrierStore for PostgresStore {
    async fn try_insert(&self, key: &BranchKey, status: BarrierStatus) -> Result<InsertOutcome> {
        // A concurrent remove_pending can delete the conflicting row between
        // the insert and the lookup; retry in that case.
        for _ in 0..3 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO saga_barrier (gid, branch_id, op, status)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (gid, branch_id, op) DO NOTHING
                "#,
            )
            .bind(key.gid.as_str())
            .bind(key.branch_id.as_str())
            .bind(key.op.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                return Ok(InsertOutcome::Inserted);
            }

            if let Some(existing) = self.status(key).await? {
                return Ok(InsertOutcome::Existing(existing));
            }
        }

        Err(StoreError::Corrupt(format!("barrier {key} kept disappearing")))
    }

    async fn mark_applied(&self, key: &BranchKey) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE saga_barrier SET status = 'applied', updated_at = NOW()
            WHERE gid = $1 AND branch_id = $2 AND op = $3
            "#,
        )
        .bind(key.gid.as_str())
        .bind(key.branch_id.as_str())
        .bind(key.op.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("barrier {key}")));
        }
        Ok(())
    }

    async fn remove_pending(&self, key: &BranchKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM saga_barrier
            WHERE gid = $1 AND branch_id = $2 AND op = $3 AND status = 'pending'
            "#,
        )
        .bind(key.gid.as_str())
        .bind(key.branch_id.as_str())
        .bind(key.op.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn status(&self, key: &BranchKey) -> Result<Option<BarrierStatus>> {
        let row = sqlx::query(
            "SELECT status FROM saga_barrier WHERE gid = $1 AND branch_id = $2 AND op = $3",
        )
        .bind(key.gid.as_str())
        .bind(key.branch_id.as_str())
        .bind(key.op.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_status).transpose()
    }
}
