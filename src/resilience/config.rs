//! # Circuit Breaker Configuration
//!
//! Runtime settings for a single circuit breaker. The file-backed,
//! per-service form lives in `crate::config::CircuitBreakersConfig` and is
//! converted into this struct when a breaker is created.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Number of consecutive successes in half-open state to close circuit
    pub success_threshold: u32,

    /// Time to wait in open state before admitting a trial call
    pub reset_timeout: Duration,

    /// Upper bound on a single protected call
    pub request_timeout: Duration,

    /// Concurrent trial calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    /// Strict, fast-failing profile for a critical LLM API
    pub fn for_llm_api() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }

    /// Lenient profile for an optional cache backend
    pub fn for_cache_backend() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(2),
            half_open_max_calls: 1,
        }
    }

    /// Profile for third-party data APIs (weather, search)
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            half_open_max_calls: 1,
        }
    }

    /// Slow upstreams (image and video generation)
    pub fn for_media_generation() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(180),
            half_open_max_calls: 1,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }

        if self.reset_timeout > Duration::from_secs(3600) {
            return Err("reset_timeout should not exceed 3600 seconds".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.half_open_max_calls == 0 {
            return Err("half_open_max_calls must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}
