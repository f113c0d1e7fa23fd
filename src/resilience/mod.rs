//! # Resilience Module
//!
//! Per-service circuit breakers protecting calls to flaky upstream services
//! (LLM APIs, weather and search APIs, media generation).
//!
//! ## Components
//!
//! - [`CircuitBreaker`]: closed / open / half-open state machine with request timeouts
//! - [`CircuitBreakerRegistry`]: lazily created breakers keyed by service name
//! - [`CircuitBreakerConfig`]: thresholds, timeouts and named presets
//! - Metrics: per-breaker counters, status records and a registry-wide health score
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bakame_resilience::resilience::CircuitBreakerRegistry;
//!
//! # async fn example() {
//! let registry = CircuitBreakerRegistry::default();
//! let forecast = registry
//!     .execute(
//!         "weather",
//!         || async { Ok::<_, std::io::Error>("sunny".to_string()) },
//!         "unavailable".to_string(),
//!     )
//!     .await;
//! # let _ = forecast;
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitState, FailureReason, FailureRecord,
};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerRegistry;
pub use metrics::{CircuitBreakerMetrics, CircuitBreakerStatus, SystemCircuitBreakerMetrics};
