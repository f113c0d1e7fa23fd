use bakame_resilience::config::{EndpointPolicy, Quota, RateLimitConfig};
use bakame_resilience::rate_limit::RateLimiter;
use bakame_resilience::resilience::CircuitBreakerConfig;
use bakame_resilience::store::{KeyValueStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

/// Fresh in-memory store, isolated per test
pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

/// Rate limit configuration with an anonymous quota on one endpoint
pub fn config_with_quota(endpoint: &str, max_requests: u32, window_seconds: u64) -> RateLimitConfig {
    RateLimitConfig::default().with_endpoint(
        endpoint,
        EndpointPolicy::new(
            Quota::new(max_requests, window_seconds),
            Quota::new(max_requests * 2, window_seconds),
        ),
    )
}

pub fn limiter_with_quota(
    store: Arc<dyn KeyValueStore>,
    endpoint: &str,
    max_requests: u32,
    window_seconds: u64,
) -> RateLimiter {
    RateLimiter::new(store, config_with_quota(endpoint, max_requests, window_seconds))
        .expect("valid rate limit configuration")
}

/// Breaker settings with short timers for paused-clock tests
pub fn fast_breaker_config(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        success_threshold,
        reset_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(200),
        half_open_max_calls: 1,
    }
}
