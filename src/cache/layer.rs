//! Cache-aside layer over a [`KeyValueStore`].
//!
//! Every store failure degrades to a miss or a skipped write. The only
//! error a caller ever sees is the one returned by its own operation inside
//! [`CacheLayer::with_cache`].

use super::errors::CacheError;
use super::key::namespace_pattern;
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::CacheConfig;
use crate::logging::log_substrate_failure;
use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "cache";

/// Cache-aside helper
///
/// Cloning is cheap; clones share the store and statistics.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("store", &self.store.provider_name())
            .field("enabled", &self.config.enabled)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// A disabled cache is a pass-through
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Configured TTL for a namespace
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.config.ttl_for(namespace)
    }

    /// Read and decode a cached value; any failure is a miss
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }

        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.stats.record_hit();
                    debug!(key = key, "Cache HIT");
                    Some(value)
                }
                Err(e) => {
                    self.stats.record_error();
                    self.stats.record_miss();
                    let error = CacheError::DeserializationError {
                        key: key.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(key = key, error = %error, "Malformed cache entry treated as miss");
                    None
                }
            },
            Ok(None) => {
                self.stats.record_miss();
                debug!(key = key, "Cache MISS");
                None
            }
            Err(e) => {
                self.stats.record_error();
                self.stats.record_miss();
                log_substrate_failure(COMPONENT, "read", &e);
                None
            }
        }
    }

    /// Serialize and store a value, replacing any previous value and TTL
    pub async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if !self.is_enabled() {
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.record_error();
                let error = CacheError::SerializationError(e.to_string());
                log_substrate_failure(COMPONENT, "write", &error);
                return;
            }
        };

        match self.store.set(key, &raw, Some(ttl)).await {
            Ok(()) => debug!(key = key, ttl_seconds = ttl.as_secs(), "Cache SET"),
            Err(e) => {
                self.stats.record_error();
                log_substrate_failure(COMPONENT, "write", &e);
            }
        }
    }

    /// Return the cached value for `key`, or run `operation` and cache its
    /// successful result
    ///
    /// Operation errors propagate unchanged and are never cached. Concurrent
    /// misses for the same key each run `operation`; there is no
    /// single-flight de-duplication.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        operation: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.read::<T>(key).await {
            return Ok(cached);
        }

        let value = operation().await?;
        self.write(key, &value, ttl).await;
        Ok(value)
    }

    /// Delete an exact key, or every key matching a glob pattern
    ///
    /// Returns how many entries were removed. Patterns need a store that can
    /// enumerate keys; otherwise nothing is removed.
    pub async fn invalidate(&self, pattern_or_key: &str) -> u64 {
        if !is_glob(pattern_or_key) {
            return match self.store.del(pattern_or_key).await {
                Ok(removed) => {
                    debug!(key = pattern_or_key, "Cache DEL");
                    u64::from(removed)
                }
                Err(e) => {
                    self.stats.record_error();
                    log_substrate_failure(COMPONENT, "invalidate", &e);
                    0
                }
            };
        }

        if !self.store.capabilities().key_enumeration {
            warn!(
                pattern = pattern_or_key,
                provider = self.store.provider_name(),
                "Pattern invalidation requested but store cannot enumerate keys"
            );
            return 0;
        }

        let keys = match self.store.keys(pattern_or_key).await {
            Ok(keys) => keys,
            Err(e) => {
                self.stats.record_error();
                log_substrate_failure(COMPONENT, "invalidate", &e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in &keys {
            match self.store.del(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    self.stats.record_error();
                    log_substrate_failure(COMPONENT, "invalidate", &e);
                }
            }
        }

        debug!(
            pattern = pattern_or_key,
            deleted = removed,
            "Cache pattern DEL"
        );
        removed
    }

    /// Drop every entry of a namespace
    pub async fn invalidate_namespace(&self, namespace: &str) -> u64 {
        self.invalidate(&namespace_pattern(namespace)).await
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

/// Unescaped `*` or `?` makes the argument a pattern
fn is_glob(candidate: &str) -> bool {
    let mut escaped = false;
    for c in candidate.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '*' | '?' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Forecast {
        city: String,
        celsius: i32,
    }

    fn layer() -> CacheLayer {
        CacheLayer::new(Arc::new(MemoryStore::new()), CacheConfig::default())
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let cache = layer();
        let value = Forecast {
            city: "Kigali".to_string(),
            celsius: 24,
        };
        cache
            .write("cache:weather:abc", &value, Duration::from_secs(60))
            .await;
        assert_eq!(cache.read::<Forecast>("cache:weather:abc").await, Some(value));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_malformed_value_is_miss_and_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("cache:weather:bad", "{not json", None).await.unwrap();
        let cache = CacheLayer::new(store, CacheConfig::default());

        assert_eq!(cache.read::<Forecast>("cache:weather:bad").await, None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.errors), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_disabled_cache_is_pass_through() {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = CacheLayer::new(store.clone(), config);

        cache.write("k", &1u32, Duration::from_secs(60)).await;
        assert!(store.is_empty());
        assert_eq!(cache.read::<u32>("k").await, None);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_invalidate_exact_key_and_pattern() {
        let cache = layer();
        let ttl = Duration::from_secs(60);
        cache.write("cache:weather:1", &1, ttl).await;
        cache.write("cache:weather:2", &2, ttl).await;
        cache.write("cache:documents:1", &3, ttl).await;

        assert_eq!(cache.invalidate("cache:weather:1").await, 1);
        assert_eq!(cache.invalidate("cache:weather:1").await, 0);
        assert_eq!(cache.invalidate_namespace("weather").await, 1);
        assert_eq!(cache.read::<i32>("cache:documents:1").await, Some(3));
    }

    #[test]
    fn test_is_glob() {
        assert!(is_glob("cache:weather:*"));
        assert!(is_glob("cache:?"));
        assert!(!is_glob("cache:weather:abc"));
        assert!(!is_glob(r"literal\*star"));
    }
}
