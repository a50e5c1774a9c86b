//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{BranchId, BranchKey, BranchOp, Gid};
use domain::{CartLineId, Money, NewCartLine, NewTradeOrder, ProductId, SkuId, UserId};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    BarrierStatus, BarrierStore, CartStore, Decrement, InsertOutcome, OrderStore, PostgresStore,
    ProductCatalog, StockStore, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with cleared tables and one seeded sku (id 1, stock 10).
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE saga_barrier, trade_order, shopping_cart, product_sku, product RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO product (id, name, main_picture) VALUES (10, 'Widget', 'widget.png')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO product_sku (id, product_id, name, sell_price, stock) VALUES (1, 10, 'Widget / red', 1999, 10)",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn new_line(correlation_key: &str) -> NewCartLine {
    NewCartLine {
        user_id: UserId::new(5),
        product_id: ProductId::new(10),
        sku_id: SkuId::new(1),
        product_name: "Widget".to_string(),
        product_main_picture: "widget.png".to_string(),
        quantity: 3,
        correlation_key: correlation_key.to_string(),
    }
}

fn action_key(gid: &str) -> BranchKey {
    BranchKey::new(
        Gid::parse(gid).unwrap(),
        BranchId::for_step(0),
        BranchOp::Action,
    )
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn reads_seeded_catalog() {
    let store = get_test_store().await;

    let product = store.get_product(ProductId::new(10)).await.unwrap().unwrap();
    assert!(product.is_orderable());

    let sku = store.get_sku(SkuId::new(1)).await.unwrap().unwrap();
    assert_eq!(sku.sell_price, Money::from_cents(1999));
    assert_eq!(sku.quantity_available, 10);
    assert!(store.get_sku(SkuId::new(2)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn conditional_decrement() {
    let store = get_test_store().await;

    assert_eq!(
        store.try_decrement(SkuId::new(1), 3).await.unwrap(),
        Decrement::Applied { remaining: 7 }
    );
    assert_eq!(
        store.try_decrement(SkuId::new(1), 8).await.unwrap(),
        Decrement::Insufficient { available: 7 }
    );
    assert_eq!(
        store.try_decrement(SkuId::new(9), 1).await.unwrap(),
        Decrement::UnknownSku
    );
    assert_eq!(store.increment(SkuId::new(1), 3).await.unwrap(), 10);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_decrement(SkuId::new(1), 1).await.unwrap() })
        })
        .collect();

    let results = futures_util::future::join_all(tasks).await;
    let applied = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Decrement::Applied { .. })))
        .count();

    assert_eq!(applied, 10);
    let sku = store.get_sku(SkuId::new(1)).await.unwrap().unwrap();
    assert_eq!(sku.quantity_available, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn cart_line_lifecycle() {
    let store = get_test_store().await;

    let line = store.insert_line(new_line("g1:02")).await.unwrap();
    assert!(line.is_active());

    let err = store.insert_line(new_line("g1:02")).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));

    let found = store.find_line_by_correlation("g1:02").await.unwrap();
    assert_eq!(found.map(|l| l.id), Some(line.id));

    assert!(store.retire_line(line.id).await.unwrap());
    assert!(!store.retire_line(line.id).await.unwrap());
    assert!(store.restore_line(line.id).await.unwrap());

    assert!(store.retire_line_by_correlation("g1:02").await.unwrap());
    assert!(!store.retire_line_by_correlation("g1:02").await.unwrap());
    let line = store.get_line(line.id).await.unwrap().unwrap();
    assert!(line.is_deleted);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn trade_order_lifecycle() {
    let store = get_test_store().await;

    let new_order = NewTradeOrder::new(
        UserId::new(5),
        Money::from_cents(5997),
        vec![CartLineId::new(1), CartLineId::new(2)],
        false,
        7,
        "g2:02",
        Utc::now(),
    )
    .unwrap();
    let order_no = new_order.order_no.clone();

    let order = store.insert_order(new_order.clone()).await.unwrap();
    assert_eq!(order.cart_ids.len(), 2);
    assert_eq!(order.order_status.code(), 1);

    let err = store.insert_order(new_order).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));

    let by_no = store.find_order_by_no(&order_no).await.unwrap().unwrap();
    assert_eq!(by_no.id, order.id);

    assert!(store.retire_order_by_correlation("g2:02").await.unwrap());
    assert!(!store.retire_order_by_correlation("g2:02").await.unwrap());
    let order = store.get_order(order.id).await.unwrap().unwrap();
    assert!(order.is_deleted);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn barrier_first_writer_wins() {
    let store = get_test_store().await;
    let key = action_key("g3");

    assert_eq!(
        store.try_insert(&key, BarrierStatus::Pending).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        store.try_insert(&key, BarrierStatus::Voided).await.unwrap(),
        InsertOutcome::Existing(BarrierStatus::Pending)
    );

    store.mark_applied(&key).await.unwrap();
    store.remove_pending(&key).await.unwrap();
    assert_eq!(
        store.status(&key).await.unwrap(),
        Some(BarrierStatus::Applied)
    );

    let other = action_key("g4");
    store.try_insert(&other, BarrierStatus::Pending).await.unwrap();
    store.remove_pending(&other).await.unwrap();
    assert_eq!(store.status(&other).await.unwrap(), None);
}
