//! # Test Utilities
//!
//! Doubles shared by unit and integration tests: a store whose backend is
//! always down, and a counter for asserting how often an upstream ran.

use crate::store::{KeyValueStore, StoreCapabilities, StoreError, StoreResult, WindowSnapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store whose every operation fails with a connection error
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    capabilities: StoreCapabilities,
}

impl Default for UnavailableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UnavailableStore {
    /// Advertises the full capability set of a distributed store
    pub fn new() -> Self {
        Self {
            capabilities: StoreCapabilities {
                ordered_sets: true,
                key_enumeration: true,
                distributed: true,
            },
        }
    }

    /// Advertises no ordered sets, so limiters pick the fixed window
    pub fn without_ordered_sets() -> Self {
        Self {
            capabilities: StoreCapabilities {
                ordered_sets: false,
                key_enumeration: false,
                distributed: true,
            },
        }
    }

    fn down<T>() -> StoreResult<T> {
        Err(StoreError::ConnectionError(
            "connection refused (unavailable test store)".to_string(),
        ))
    }
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Self::down()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        Self::down()
    }

    async fn incr(&self, _key: &str) -> StoreResult<i64> {
        Self::down()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        Self::down()
    }

    async fn del(&self, _key: &str) -> StoreResult<bool> {
        Self::down()
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        Self::down()
    }

    async fn ttl(&self, _key: &str) -> StoreResult<Option<Duration>> {
        Self::down()
    }

    async fn keys(&self, _pattern: &str) -> StoreResult<Vec<String>> {
        Self::down()
    }

    async fn zadd(&self, _key: &str, _score: f64, _member: &str) -> StoreResult<()> {
        Self::down()
    }

    async fn zrem_range_by_score(&self, _key: &str, _min: f64, _max: f64) -> StoreResult<u64> {
        Self::down()
    }

    async fn zcard(&self, _key: &str) -> StoreResult<u64> {
        Self::down()
    }

    async fn zrange_with_scores(
        &self,
        _key: &str,
        _start: i64,
        _stop: i64,
    ) -> StoreResult<Vec<(String, f64)>> {
        Self::down()
    }

    async fn record_window_hit(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
        _member: &str,
    ) -> StoreResult<WindowSnapshot> {
        Self::down()
    }

    async fn window_snapshot(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
    ) -> StoreResult<WindowSnapshot> {
        Self::down()
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(false)
    }

    fn provider_name(&self) -> &'static str {
        "unavailable"
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

/// Shared counter of upstream invocations
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation, returning the new total
    pub fn hit(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
