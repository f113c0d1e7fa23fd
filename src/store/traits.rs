//! Key-value store trait definition

use super::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use std::time::Duration;

/// Features a store declares at construction
///
/// Callers branch on these flags once, when they are built, instead of
/// probing the backend per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Sorted-set primitives and the atomic window batch are available
    pub ordered_sets: bool,
    /// `keys(pattern)` enumerates matching keys
    pub key_enumeration: bool,
    /// State is shared across processes
    pub distributed: bool,
}

/// Result of recording or inspecting a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
    /// Entries inside the window
    pub count: u64,
    /// Score (epoch millis) of the oldest entry inside the window
    pub oldest_ms: Option<u64>,
}

/// Trait defining key-value store operations
///
/// Implemented by the in-memory and Redis stores. Values are strings or
/// sorted sets; every entry may carry an expiry after which it behaves as
/// absent. All operations are async and return `StoreResult`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key; `None` if never set or expired
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value, replacing both value and expiry. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Atomically increment an integer value, treating absent as 0
    ///
    /// An existing expiry is preserved.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Set or overwrite the expiry of an existing key; `false` if absent
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete a key; `true` if something was removed
    async fn del(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining lifetime; `None` if absent or non-expiring
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Keys matching a glob pattern (`*`, `?`)
    async fn keys(&self, _pattern: &str) -> StoreResult<Vec<String>> {
        Err(StoreError::unsupported(self.provider_name(), "keys"))
    }

    async fn zadd(&self, _key: &str, _score: f64, _member: &str) -> StoreResult<()> {
        Err(StoreError::unsupported(self.provider_name(), "zadd"))
    }

    /// Remove members with `min <= score <= max`, returning how many went
    async fn zrem_range_by_score(&self, _key: &str, _min: f64, _max: f64) -> StoreResult<u64> {
        Err(StoreError::unsupported(
            self.provider_name(),
            "zrem_range_by_score",
        ))
    }

    async fn zcard(&self, _key: &str) -> StoreResult<u64> {
        Err(StoreError::unsupported(self.provider_name(), "zcard"))
    }

    /// Members by ascending score, inclusive indices, negatives count from the end
    async fn zrange_with_scores(
        &self,
        _key: &str,
        _start: i64,
        _stop: i64,
    ) -> StoreResult<Vec<(String, f64)>> {
        Err(StoreError::unsupported(
            self.provider_name(),
            "zrange_with_scores",
        ))
    }

    /// Atomically trim entries older than `now_ms - window_ms`, add `member`
    /// scored `now_ms`, count, read the oldest entry and set the key's expiry
    /// to the window length
    async fn record_window_hit(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
        _member: &str,
    ) -> StoreResult<WindowSnapshot> {
        Err(StoreError::unsupported(
            self.provider_name(),
            "record_window_hit",
        ))
    }

    /// Count entries inside the window without recording anything
    async fn window_snapshot(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
    ) -> StoreResult<WindowSnapshot> {
        Err(StoreError::unsupported(
            self.provider_name(),
            "window_snapshot",
        ))
    }

    /// Check if the store backend is healthy
    async fn health_check(&self) -> StoreResult<bool>;

    /// Get the name of the store provider
    fn provider_name(&self) -> &'static str;

    fn capabilities(&self) -> StoreCapabilities;
}
