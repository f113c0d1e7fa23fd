//! Per-endpoint, per-identity request limiting over a [`KeyValueStore`].
//!
//! The counting algorithm is fixed when the limiter is built: sliding window
//! when the store declares ordered-set support, fixed window otherwise.
//! Store failures on the request path fail open.

use super::decision::RateLimitDecision;
use super::errors::{RateLimitError, RateLimitResult};
use crate::config::{Quota, RateLimitAlgorithmPreference, RateLimitConfig};
use crate::constants::RATE_LIMIT_KEY_PREFIX;
use crate::logging::log_substrate_failure;
use crate::store::{KeyValueStore, StoreError, StoreResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const COMPONENT: &str = "rate_limiter";

/// Counting algorithm in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    /// Sorted set of request timestamps, trimmed on every write
    SlidingWindow,
    /// Counter expiring one window after the first request
    FixedWindow,
}

/// Rate limiter
///
/// Cloning is cheap; clones share the store and configuration.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    config: Arc<RateLimitConfig>,
    algorithm: RateLimitAlgorithm,
    bypass: bool,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.provider_name())
            .field("algorithm", &self.algorithm)
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl RateLimiter {
    /// Build a limiter, validating the quotas and choosing the algorithm
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> RateLimitResult<Self> {
        config.validate()?;

        let capabilities = store.capabilities();
        let algorithm = match config.algorithm {
            RateLimitAlgorithmPreference::Auto if capabilities.ordered_sets => {
                RateLimitAlgorithm::SlidingWindow
            }
            RateLimitAlgorithmPreference::Auto => RateLimitAlgorithm::FixedWindow,
            RateLimitAlgorithmPreference::SlidingWindow if capabilities.ordered_sets => {
                RateLimitAlgorithm::SlidingWindow
            }
            RateLimitAlgorithmPreference::SlidingWindow => {
                return Err(RateLimitError::Configuration(format!(
                    "sliding_window requires ordered set support, which the '{}' store does not provide",
                    store.provider_name()
                )));
            }
            RateLimitAlgorithmPreference::FixedWindow => RateLimitAlgorithm::FixedWindow,
        };

        info!(
            algorithm = ?algorithm,
            store = store.provider_name(),
            endpoints = config.endpoints.len(),
            "Rate limiter initialized"
        );

        Ok(Self {
            store,
            config: Arc::new(config),
            algorithm,
            bypass: false,
        })
    }

    /// Allow every request without touching the store
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        if bypass {
            info!("Rate limiting bypassed (development mode)");
        }
        self.bypass = bypass;
        self
    }

    pub fn algorithm(&self) -> RateLimitAlgorithm {
        self.algorithm
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Store key holding the state of one endpoint/identifier scope
    pub fn scope_key(endpoint: &str, identifier: &str) -> String {
        format!("{}:{}:{}", RATE_LIMIT_KEY_PREFIX, endpoint, identifier)
    }

    /// Quota applied to an endpoint and identity class
    pub fn quota_for(&self, endpoint: &str, is_authenticated: bool) -> Quota {
        // Validation guarantees a default policy
        self.config
            .policy_for(endpoint)
            .map(|policy| policy.quota(is_authenticated))
            .unwrap_or(Quota::new(u32::MAX, 1))
    }

    /// Record a request and decide whether it may proceed
    pub async fn check_rate_limit(
        &self,
        endpoint: &str,
        identifier: &str,
        is_authenticated: bool,
    ) -> RateLimitDecision {
        self.check_rate_limit_at(endpoint, identifier, is_authenticated, Utc::now())
            .await
    }

    /// [`check_rate_limit`](Self::check_rate_limit) with an explicit request time
    ///
    /// Sliding windows are scored by this timestamp. Fixed windows expire on
    /// the store's own clock regardless of `now`.
    pub async fn check_rate_limit_at(
        &self,
        endpoint: &str,
        identifier: &str,
        is_authenticated: bool,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let quota = self.quota_for(endpoint, is_authenticated);
        if self.bypass {
            return RateLimitDecision::unrestricted(quota.max_requests, window_end(now, quota));
        }

        let key = Self::scope_key(endpoint, identifier);
        let result = match self.algorithm {
            RateLimitAlgorithm::SlidingWindow => self.record_sliding(&key, quota, now).await,
            RateLimitAlgorithm::FixedWindow => self.record_fixed(&key, quota, now).await,
        };

        match result {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(
                        endpoint = endpoint,
                        identifier = identifier,
                        limit = decision.limit,
                        retry_after = decision.retry_after,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                log_substrate_failure(COMPONENT, "check_rate_limit", &e);
                RateLimitDecision::unrestricted(quota.max_requests, window_end(now, quota))
            }
        }
    }

    /// Current quota state without recording a request
    ///
    /// `allowed` answers whether one more request would be accepted.
    pub async fn get_rate_limit_status(
        &self,
        endpoint: &str,
        identifier: &str,
        is_authenticated: bool,
    ) -> RateLimitDecision {
        self.get_rate_limit_status_at(endpoint, identifier, is_authenticated, Utc::now())
            .await
    }

    /// [`get_rate_limit_status`](Self::get_rate_limit_status) as seen at `now`
    pub async fn get_rate_limit_status_at(
        &self,
        endpoint: &str,
        identifier: &str,
        is_authenticated: bool,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let quota = self.quota_for(endpoint, is_authenticated);
        if self.bypass {
            return RateLimitDecision::unrestricted(quota.max_requests, window_end(now, quota));
        }

        let key = Self::scope_key(endpoint, identifier);
        let result = match self.algorithm {
            RateLimitAlgorithm::SlidingWindow => self.peek_sliding(&key, quota, now).await,
            RateLimitAlgorithm::FixedWindow => self.peek_fixed(&key, quota, now).await,
        };

        result.unwrap_or_else(|e| {
            log_substrate_failure(COMPONENT, "get_rate_limit_status", &e);
            RateLimitDecision::unrestricted(quota.max_requests, window_end(now, quota))
        })
    }

    /// Clear the recorded requests of a scope; `true` if anything was removed
    pub async fn reset_rate_limit(&self, endpoint: &str, identifier: &str) -> RateLimitResult<bool> {
        let key = Self::scope_key(endpoint, identifier);
        let removed = self.store.del(&key).await?;
        info!(
            endpoint = endpoint,
            identifier = identifier,
            removed = removed,
            "Rate limit reset"
        );
        Ok(removed)
    }

    async fn record_sliding(
        &self,
        key: &str,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitDecision> {
        let now_ms = epoch_millis(now);
        let member = format!("{}-{}", now_ms, Uuid::new_v4());
        let snapshot = self
            .store
            .record_window_hit(key, now_ms, quota.window_millis(), &member)
            .await?;

        let reset_ms = snapshot
            .oldest_ms
            .unwrap_or(now_ms)
            .saturating_add(quota.window_millis());
        Ok(decide(
            quota,
            snapshot.count,
            snapshot.count <= u64::from(quota.max_requests),
            now_ms,
            reset_ms,
        ))
    }

    async fn peek_sliding(
        &self,
        key: &str,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitDecision> {
        let now_ms = epoch_millis(now);
        let snapshot = self
            .store
            .window_snapshot(key, now_ms, quota.window_millis())
            .await?;

        let reset_ms = snapshot
            .oldest_ms
            .unwrap_or(now_ms)
            .saturating_add(quota.window_millis());
        Ok(decide(
            quota,
            snapshot.count,
            snapshot.count < u64::from(quota.max_requests),
            now_ms,
            reset_ms,
        ))
    }

    async fn record_fixed(
        &self,
        key: &str,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitDecision> {
        let count = self.store.incr(key).await?;
        if count == 1 {
            self.store.expire(key, quota.window()).await?;
        }

        let remaining_window = self.fixed_window_remaining(key, quota, count == 1).await?;
        let count = count.max(0) as u64;
        let now_ms = epoch_millis(now);
        Ok(decide(
            quota,
            count,
            count <= u64::from(quota.max_requests),
            now_ms,
            now_ms.saturating_add(remaining_window.as_millis() as u64),
        ))
    }

    async fn peek_fixed(
        &self,
        key: &str,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitDecision> {
        let count = match self.store.get(key).await? {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                StoreError::TypeMismatch(format!(
                    "rate limit counter at '{key}' is not an integer: '{raw}'"
                ))
            })?,
            None => 0,
        };
        let remaining_window = match self.store.ttl(key).await? {
            Some(ttl) => ttl,
            None => quota.window(),
        };
        let now_ms = epoch_millis(now);
        Ok(decide(
            quota,
            count,
            count < u64::from(quota.max_requests),
            now_ms,
            now_ms.saturating_add(remaining_window.as_millis() as u64),
        ))
    }

    /// Time until a fixed window resets, repairing a counter left without expiry
    async fn fixed_window_remaining(
        &self,
        key: &str,
        quota: Quota,
        just_created: bool,
    ) -> StoreResult<Duration> {
        if just_created {
            return Ok(quota.window());
        }
        match self.store.ttl(key).await? {
            Some(ttl) => Ok(ttl),
            None => {
                // A crash between INCR and EXPIRE would otherwise never reset
                self.store.expire(key, quota.window()).await?;
                Ok(quota.window())
            }
        }
    }
}

fn decide(quota: Quota, count: u64, allowed: bool, now_ms: u64, reset_ms: u64) -> RateLimitDecision {
    let remaining = u64::from(quota.max_requests).saturating_sub(count) as u32;
    let retry_after = (!allowed).then(|| reset_ms.saturating_sub(now_ms).div_ceil(1000).max(1));
    RateLimitDecision {
        allowed,
        limit: quota.max_requests,
        remaining,
        reset_time: from_epoch_millis(reset_ms),
        retry_after,
    }
}

fn epoch_millis(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

fn from_epoch_millis(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn window_end(now: DateTime<Utc>, quota: Quota) -> DateTime<Utc> {
    from_epoch_millis(epoch_millis(now).saturating_add(quota.window_millis()))
}
