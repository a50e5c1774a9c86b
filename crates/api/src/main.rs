//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, Stores};
use saga::{Coordinator, DtmCoordinator};
use store::{InMemorySessionCache, InMemoryStore, PostgresStore, RedisSessionCache};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const MAX_DB_CONNECTIONS: u32 = 10;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_stores(config: &Config) -> Stores {
    let (sessions, sessions_kind): (Arc<dyn store::SessionCache>, _) = match &config.redis_url {
        Some(url) => {
            let cache = RedisSessionCache::connect(url)
                .await
                .expect("failed to connect to Redis");
            (Arc::new(cache), "redis")
        }
        None => {
            tracing::warn!("REDIS_URL not set, sessions are kept in memory");
            (Arc::new(InMemorySessionCache::new()), "memory")
        }
    };

    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, MAX_DB_CONNECTIONS)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            Stores::shared(store, "postgres", sessions, sessions_kind)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Stores::shared(InMemoryStore::new(), "memory", sessions, sessions_kind)
        }
    }
}

fn build_coordinator(config: &Config) -> Option<Arc<dyn Coordinator>> {
    let url = config.coordinator_url.as_ref()?;
    let client = reqwest::Client::builder()
        .timeout(config.coordinator_timeout)
        .build()
        .expect("failed to build HTTP client");
    Some(Arc::new(DtmCoordinator::new(client, url.clone())))
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect backends and build application state
    let stores = build_stores(&config).await;
    let coordinator = build_coordinator(&config);
    let state = AppState::new(stores, coordinator, &config);
    tracing::info!(
        store = state.backends.store,
        sessions = state.backends.sessions,
        coordinator = state.backends.coordinator,
        participants = %config.participant_base_url,
        "backends ready"
    );

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
