//! Checks run before a saga is built: who is calling, and whether the
//! entities the saga will touch exist.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    session_cache_key, user_key_from_token, validate_quantity, CartLine, CartLineId, Money,
    Product, ProductId, SkuId, StockRecord, UserId,
};
use store::{CartStore, ProductCatalog, SessionCache, StockStore};

use crate::error::PreCheckError;

/// Default sliding session lifetime: 100 hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(360_000);

/// Everything the add-to-cart saga needs, resolved up front.
#[derive(Debug, Clone)]
pub struct AddToCartPlan {
    pub user_id: UserId,
    pub product: Product,
    pub sku: StockRecord,
    pub quantity: u32,
}

/// Cart lines to order and their total at current prices.
#[derive(Debug, Clone)]
pub struct PlaceOrderPlan {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub total: Money,
}

pub struct PreCheckGate {
    sessions: Arc<dyn SessionCache>,
    catalog: Arc<dyn ProductCatalog>,
    stock: Arc<dyn StockStore>,
    carts: Arc<dyn CartStore>,
    session_ttl: Duration,
}

impl PreCheckGate {
    pub fn new(
        sessions: Arc<dyn SessionCache>,
        catalog: Arc<dyn ProductCatalog>,
        stock: Arc<dyn StockStore>,
        carts: Arc<dyn CartStore>,
    ) -> Self {
        Self {
            sessions,
            catalog,
            stock,
            carts,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Resolves the caller's user key and checks that a session exists.
    ///
    /// A successful check slides the session expiry forward.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<UserId, PreCheckError> {
        let user_id = user_key_from_token(token)?;
        let key = session_cache_key(user_id);

        if self.sessions.get_session(&key).await?.is_none() {
            tracing::debug!(%user_id, "no session");
            return Err(PreCheckError::Unauthenticated(
                "no active session".to_string(),
            ));
        }

        self.sessions.refresh(&key, self.session_ttl).await?;
        Ok(user_id)
    }

    /// Checks an add-to-cart request.
    ///
    /// The stock check only fails fast; the reservation step decides.
    #[tracing::instrument(skip(self))]
    pub async fn check_add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
        number: i64,
    ) -> Result<AddToCartPlan, PreCheckError> {
        let quantity = validate_quantity(number)?;

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .filter(Product::is_orderable)
            .ok_or(PreCheckError::ProductUnavailable(product_id))?;

        let sku = self
            .stock
            .get_sku(sku_id)
            .await?
            .ok_or(PreCheckError::UnknownSku(sku_id))?;
        if sku.product_id != product_id {
            return Err(PreCheckError::SkuMismatch { sku_id, product_id });
        }
        if !sku.can_reserve(quantity) {
            return Err(PreCheckError::InsufficientStock {
                sku_id,
                requested: quantity,
                available: sku.quantity_available,
            });
        }

        Ok(AddToCartPlan {
            user_id,
            product,
            sku,
            quantity,
        })
    }

    /// Checks a place-order request and prices it.
    #[tracing::instrument(skip(self))]
    pub async fn check_place_order(
        &self,
        user_id: UserId,
        cart_ids: &[CartLineId],
    ) -> Result<PlaceOrderPlan, PreCheckError> {
        if cart_ids.is_empty() {
            return Err(PreCheckError::InvalidRequest(
                "cart_ids must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = cart_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(PreCheckError::InvalidRequest(format!(
                "cart line {dup} listed twice"
            )));
        }

        let mut lines = Vec::with_capacity(cart_ids.len());
        let mut total = Money::zero();

        for &cart_id in cart_ids {
            let line = self
                .carts
                .get_line(cart_id)
                .await?
                .ok_or(PreCheckError::CartLineNotFound(cart_id))?;
            if line.user_id != user_id {
                return Err(PreCheckError::CartLineNotOwned(cart_id));
            }
            if !line.is_active() {
                return Err(PreCheckError::CartLineUnavailable(cart_id));
            }

            let sku = self
                .stock
                .get_sku(line.sku_id)
                .await?
                .ok_or(PreCheckError::UnknownSku(line.sku_id))?;
            total += line.total_at(sku.sell_price);
            lines.push(line);
        }

        Ok(PlaceOrderPlan {
            user_id,
            lines,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::NewCartLine;
    use store::{InMemorySessionCache, InMemoryStore};

    const TOKEN: &str = "101";

    struct Fixture {
        gate: PreCheckGate,
        store: InMemoryStore,
        sessions: InMemorySessionCache,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        store
            .seed_product(Product {
                id: ProductId::new(10),
                name: "Widget".to_string(),
                main_picture: "widget.png".to_string(),
                is_enable: true,
                is_deleted: false,
            })
            .await;
        store
            .seed_product(Product {
                id: ProductId::new(11),
                name: "Retired".to_string(),
                main_picture: String::new(),
                is_enable: false,
                is_deleted: false,
            })
            .await;
        store
            .seed_sku(StockRecord {
                sku_id: SkuId::new(1),
                product_id: ProductId::new(10),
                name: "Widget / red".to_string(),
                sell_price: Money::from_cents(1999),
                quantity_available: 10,
            })
            .await;

        let sessions = InMemorySessionCache::new();
        sessions.insert("101", "session-token").await;

        let shared = Arc::new(store.clone());
        let gate = PreCheckGate::new(
            Arc::new(sessions.clone()),
            shared.clone(),
            shared.clone(),
            shared,
        );
        Fixture {
            gate,
            store,
            sessions,
        }
    }

    async fn cart_line(store: &InMemoryStore, owner: i64, quantity: u32, tag: &str) -> CartLineId {
        store
            .insert_line(NewCartLine {
                user_id: UserId::new(owner),
                product_id: ProductId::new(10),
                sku_id: SkuId::new(1),
                product_name: "Widget".to_string(),
                product_main_picture: String::new(),
                quantity,
                correlation_key: tag.to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_session() {
        let f = fixture().await;

        let user = f.gate.authenticate(TOKEN).await.unwrap();
        assert_eq!(user, UserId::new(5));
        assert!(f.sessions.ttl("101").await.is_some());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_and_malformed_tokens() {
        let f = fixture().await;

        let err = f.gate.authenticate("11").await.unwrap_err();
        assert!(matches!(err, PreCheckError::Unauthenticated(_)));

        let err = f.gate.authenticate("abc").await.unwrap_err();
        assert!(matches!(err, PreCheckError::Unauthenticated(_)));

        let err = f.gate.authenticate("").await.unwrap_err();
        assert!(matches!(err, PreCheckError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_add_to_cart_checks() {
        let f = fixture().await;
        let user = UserId::new(5);

        let plan = f
            .gate
            .check_add_to_cart(user, ProductId::new(10), SkuId::new(1), 3)
            .await
            .unwrap();
        assert_eq!(plan.quantity, 3);
        assert_eq!(plan.sku.sell_price, Money::from_cents(1999));

        let err = f
            .gate
            .check_add_to_cart(user, ProductId::new(11), SkuId::new(1), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::ProductUnavailable(_)));

        let err = f
            .gate
            .check_add_to_cart(user, ProductId::new(10), SkuId::new(7), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::UnknownSku(_)));

        let err = f
            .gate
            .check_add_to_cart(user, ProductId::new(10), SkuId::new(1), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::InvalidRequest(_)));

        let err = f
            .gate
            .check_add_to_cart(user, ProductId::new(10), SkuId::new(1), 11)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PreCheckError::InsufficientStock { available: 10, .. }
        ));
    }

    #[tokio::test]
    async fn test_sku_must_belong_to_product() {
        let f = fixture().await;
        f.store
            .seed_product(Product {
                id: ProductId::new(12),
                name: "Other".to_string(),
                main_picture: String::new(),
                is_enable: true,
                is_deleted: false,
            })
            .await;

        let err = f
            .gate
            .check_add_to_cart(UserId::new(5), ProductId::new(12), SkuId::new(1), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::SkuMismatch { .. }));
    }

    #[tokio::test]
    async fn test_place_order_prices_lines() {
        let f = fixture().await;
        let a = cart_line(&f.store, 5, 2, "seed:01").await;
        let b = cart_line(&f.store, 5, 1, "seed:02").await;

        let plan = f
            .gate
            .check_place_order(UserId::new(5), &[a, b])
            .await
            .unwrap();
        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.total, Money::from_cents(3 * 1999));
    }

    #[tokio::test]
    async fn test_place_order_rejects_foreign_and_retired_lines() {
        let f = fixture().await;
        let foreign = cart_line(&f.store, 6, 1, "seed:01").await;
        let retired = cart_line(&f.store, 5, 1, "seed:02").await;
        f.store.retire_line(retired).await.unwrap();

        let err = f
            .gate
            .check_place_order(UserId::new(5), &[foreign])
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::CartLineNotOwned(_)));

        let err = f
            .gate
            .check_place_order(UserId::new(5), &[retired])
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::CartLineUnavailable(_)));

        let err = f
            .gate
            .check_place_order(UserId::new(5), &[CartLineId::new(99)])
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::CartLineNotFound(_)));

        let err = f
            .gate
            .check_place_order(UserId::new(5), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PreCheckError::InvalidRequest(_)));
    }
}
