//! HTTP server for the cart and trade-order saga participants.
//!
//! Serves the participant callbacks the coordinator calls (`/saga/*`), the
//! client endpoints that start sagas, and health/metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    Coordinator, Endpoints, InProcessInvoker, LocalCoordinator, Participants, PreCheckGate,
    SagaSubmitter, ShopWorkflows,
};
use store::{
    BarrierStore, CartStore, InMemorySessionCache, InMemoryStore, OrderStore, ProductCatalog,
    SessionCache, StockStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Base delay between local coordinator retries.
const STEP_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Storage handles, one per concern.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn ProductCatalog>,
    pub stock: Arc<dyn StockStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub barrier: Arc<dyn BarrierStore>,
    pub sessions: Arc<dyn SessionCache>,
    pub store_kind: &'static str,
    pub sessions_kind: &'static str,
}

impl Stores {
    /// Uses one backend for every table.
    pub fn shared<S>(
        store: S,
        store_kind: &'static str,
        sessions: Arc<dyn SessionCache>,
        sessions_kind: &'static str,
    ) -> Self
    where
        S: ProductCatalog + StockStore + CartStore + OrderStore + BarrierStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            stock: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            barrier: store,
            sessions,
            store_kind,
            sessions_kind,
        }
    }

    pub fn in_memory(store: InMemoryStore, sessions: InMemorySessionCache) -> Self {
        Self::shared(store, "memory", Arc::new(sessions), "memory")
    }
}

/// Which backends the process runs on; reported by `/health`.
#[derive(Debug, Clone, Copy)]
pub struct Backends {
    pub store: &'static str,
    pub sessions: &'static str,
    pub coordinator: &'static str,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub workflows: ShopWorkflows,
    pub participants: Participants,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub backends: Backends,
}

impl AppState {
    /// Wires participants, pre-check gate and submitter.
    ///
    /// Without an external coordinator the saga is driven in-process and
    /// branches are dispatched straight to the participants.
    pub fn new(
        stores: Stores,
        coordinator: Option<Arc<dyn Coordinator>>,
        config: &Config,
    ) -> Arc<Self> {
        let participants = Participants::new(
            stores.stock.clone(),
            stores.carts.clone(),
            stores.orders.clone(),
            stores.barrier.clone(),
        );

        let (coordinator, coordinator_kind): (Arc<dyn Coordinator>, _) = match coordinator {
            Some(external) => (external, "dtm"),
            None => {
                let invoker = InProcessInvoker::new(
                    participants.clone(),
                    config.participant_base_url.clone(),
                );
                let local = LocalCoordinator::new(Arc::new(invoker))
                    .with_retry(config.step_max_attempts, STEP_RETRY_DELAY);
                (Arc::new(local), "local")
            }
        };

        let gate = PreCheckGate::new(
            stores.sessions.clone(),
            stores.catalog.clone(),
            stores.stock.clone(),
            stores.carts.clone(),
        )
        .with_session_ttl(config.session_ttl);

        let workflows = ShopWorkflows::new(
            Arc::new(gate),
            SagaSubmitter::new(coordinator),
            Endpoints::new(config.participant_base_url.clone()),
        );

        Arc::new(Self {
            workflows,
            participants,
            carts: stores.carts,
            orders: stores.orders,
            backends: Backends {
                store: stores.store_kind,
                sessions: stores.sessions_kind,
                coordinator: coordinator_kind,
            },
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/saga/{*path}", post(routes::participants::callback))
        .route("/cart/add", post(routes::cart::add))
        .route("/cart/lines/{id}", get(routes::cart::get_line))
        .route("/orders/advance", post(routes::orders::advance))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/by-no/{order_no}", get(routes::orders::by_no))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
