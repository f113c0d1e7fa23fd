//! Store provider selected from configuration
//!
//! Uses enum dispatch so the composition root can hold one concrete type
//! regardless of backend, and degrades to the in-memory store when the
//! configured backend cannot be reached.

use super::errors::StoreResult;
use super::providers::MemoryStore;
use super::traits::{KeyValueStore, StoreCapabilities, WindowSnapshot};
use crate::config::StoreConfig;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "store-redis")]
use super::providers::RedisStore;

/// Key-value store backend chosen at startup
#[derive(Debug, Clone)]
pub enum StoreProvider {
    /// Redis protocol store (boxed to reduce enum size)
    #[cfg(feature = "store-redis")]
    Redis(Box<RedisStore>),

    /// In-process store
    Memory(MemoryStore),
}

impl StoreProvider {
    /// Create a store from configuration with graceful degradation
    ///
    /// If Redis is configured but cannot be reached, logs a warning and
    /// returns the in-memory store instead. The system never fails to start
    /// because of the store.
    pub async fn from_config_graceful(config: &StoreConfig) -> Self {
        match config.backend.as_str() {
            // "dragonfly" speaks the same protocol
            "redis" | "dragonfly" => Self::create_redis_backend(config).await,
            "memory" | "in-memory" | "moka" => Self::memory(config),
            other => {
                warn!(
                    backend = other,
                    "Unknown store backend, falling back to in-memory store"
                );
                Self::memory(config)
            }
        }
    }

    /// In-memory store with its sweeper running
    pub fn memory(config: &StoreConfig) -> Self {
        info!(
            backend = "memory",
            sweep_interval_seconds = config.sweep_interval_seconds,
            "In-memory store initialized (single process only)"
        );
        Self::Memory(MemoryStore::with_sweeper(config.sweep_interval()))
    }

    /// Attempt to create a Redis backend, falling back to memory on failure
    #[cfg(feature = "store-redis")]
    async fn create_redis_backend(config: &StoreConfig) -> Self {
        let Some(redis_config) = &config.redis else {
            warn!("Redis store selected but no [store.redis] config found, falling back to in-memory store");
            return Self::memory(config);
        };

        match RedisStore::from_config(redis_config).await {
            Ok(store) => {
                info!(backend = "redis", "Distributed store initialized successfully");
                Self::Redis(Box::new(store))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to in-memory store (graceful degradation)"
                );
                Self::memory(config)
            }
        }
    }

    /// Fallback when the store-redis feature is not enabled
    #[cfg(not(feature = "store-redis"))]
    async fn create_redis_backend(config: &StoreConfig) -> Self {
        warn!("Redis store requested but 'store-redis' feature not enabled, using in-memory store");
        Self::memory(config)
    }

    fn backend(&self) -> &dyn KeyValueStore {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(store) => store.as_ref(),
            Self::Memory(store) => store,
        }
    }
}

#[async_trait]
impl KeyValueStore for StoreProvider {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.backend().get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.backend().set(key, value, ttl).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.backend().incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.backend().expire(key, ttl).await
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.backend().del(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.backend().exists(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.backend().ttl(key).await
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.backend().keys(pattern).await
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        self.backend().zadd(key, score, member).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        self.backend().zrem_range_by_score(key, min, max).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.backend().zcard(key).await
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.backend().zrange_with_scores(key, start, stop).await
    }

    async fn record_window_hit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        member: &str,
    ) -> StoreResult<WindowSnapshot> {
        self.backend()
            .record_window_hit(key, now_ms, window_ms, member)
            .await
    }

    async fn window_snapshot(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> StoreResult<WindowSnapshot> {
        self.backend().window_snapshot(key, now_ms, window_ms).await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.backend().health_check().await
    }

    fn provider_name(&self) -> &'static str {
        self.backend().provider_name()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.backend().capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[tokio::test]
    async fn test_memory_backend_selected() {
        let provider = StoreProvider::from_config_graceful(&StoreConfig::default()).await;
        assert_eq!(provider.provider_name(), "memory");
        assert!(!provider.capabilities().distributed);
    }

    #[tokio::test]
    async fn test_unknown_backend_falls_back_to_memory() {
        let config = StoreConfig {
            backend: "memcached".to_string(),
            ..StoreConfig::default()
        };
        let provider = StoreProvider::from_config_graceful(&config).await;
        assert_eq!(provider.provider_name(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let config = StoreConfig {
            backend: "redis".to_string(),
            redis: Some(RedisConfig {
                // Reserved port, nothing listens here
                url: "redis://127.0.0.1:1".to_string(),
                connection_timeout_seconds: 1,
            }),
            ..StoreConfig::default()
        };
        let provider = StoreProvider::from_config_graceful(&config).await;
        assert_eq!(provider.provider_name(), "memory");

        provider.set("k", "v", None).await.unwrap();
        assert_eq!(provider.get("k").await.unwrap(), Some("v".to_string()));
    }
}
