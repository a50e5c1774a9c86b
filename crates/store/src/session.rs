//! Session cache backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Result, store::SessionCache};

/// Redis-backed session cache shared with the login service.
#[derive(Clone)]
pub struct RedisSessionCache {
    conn_manager: ConnectionManager,
}

impl RedisSessionCache {
    /// Connects to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager })
    }

    /// Wraps an existing connection manager.
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get_session(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let token: Option<String> = conn.get(key).await?;
        Ok(token)
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let _: () = conn.expire(key, seconds).await?;
        Ok(())
    }
}

/// In-memory session cache for tests and development runs.
#[derive(Clone, Default)]
pub struct InMemorySessionCache {
    entries: Arc<RwLock<HashMap<String, (String, Option<Instant>)>>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a session that never expires.
    pub async fn insert(&self, key: impl Into<String>, token: impl Into<String>) {
        self.entries
            .write()
            .await
            .insert(key.into(), (token.into(), None));
    }

    /// Returns the remaining lifetime of a session, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        let (_, expires_at) = entries.get(key)?;
        expires_at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get_session(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(token, expires_at)| match expires_at {
            Some(at) if *at <= Instant::now() => None,
            _ => Some(token.clone()),
        }))
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some((_, expires_at)) = self.entries.write().await.get_mut(key) {
            *expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refresh_sets_sliding_expiry() {
        let cache = InMemorySessionCache::new();
        cache.insert("101", "token").await;
        assert_eq!(cache.ttl("101").await, None);

        cache.refresh("101", Duration::from_secs(60)).await.unwrap();
        let ttl = cache.ttl("101").await.unwrap();
        assert!(ttl > Duration::from_secs(50));
        assert_eq!(
            cache.get_session("101").await.unwrap().as_deref(),
            Some("token")
        );
    }

    #[tokio::test]
    async fn expired_session_is_absent() {
        let cache = InMemorySessionCache::new();
        cache.insert("101", "token").await;
        cache.refresh("101", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get_session("101").await.unwrap(), None);
        assert_eq!(cache.get_session("missing").await.unwrap(), None);
    }
}
