#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bakame Resilience
//!
//! Rate limiting, cache-aside and circuit breaking for the Bakame AI
//! assistant services, built over one TTL-capable key-value store.
//!
//! ## Overview
//!
//! Request handlers consult the rate limiter first, read cacheable results
//! through the cache layer, and wrap calls to flaky upstreams (LLM APIs,
//! weather, web search, media generation) in per-service circuit breakers.
//! The rate limiter and the cache share the store; circuit breaker state is
//! process-local.
//!
//! ## Module Organization
//!
//! - [`store`] - `KeyValueStore` trait, in-memory and Redis backends
//! - [`cache`] - deterministic cache keys and the cache-aside layer
//! - [`rate_limit`] - sliding / fixed window quotas per endpoint and identity
//! - [`resilience`] - circuit breakers and their registry
//! - [`context`] - composition root wiring everything from configuration
//! - [`config`] - layered, validated configuration
//! - [`logging`] - tracing-subscriber initialization
//! - [`error`] - crate-level error type
//!
//! ## Failure Policy
//!
//! The substrate never turns its own failures into request failures: a store
//! outage lets requests through and turns cache reads into misses. Errors of
//! the wrapped operations are the caller's to handle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bakame_resilience::config::ConfigLoader;
//! use bakame_resilience::context::{ProtectedRequest, ResilienceContext};
//! use bakame_resilience::cache::derive_key;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! bakame_resilience::logging::init_structured_logging();
//! let context = ResilienceContext::from_config(ConfigLoader::from_env().load()?).await?;
//!
//! let key = derive_key("weather", &serde_json::json!({"city": "Kigali"}));
//! let request = ProtectedRequest::new("tools", "203.0.113.7", "weather")
//!     .cached(key, Duration::from_secs(1800));
//!
//! let outcome = context
//!     .run_protected(
//!         &request,
//!         || async { Ok::<_, std::io::Error>("22°C, light rain".to_string()) },
//!         "Weather is unavailable right now".to_string(),
//!     )
//!     .await;
//! println!("{:?}", outcome.source());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod resilience;
pub mod store;
pub mod testing;

pub use cache::{derive_key, CacheLayer};
pub use config::{ConfigLoader, Environment, ResilienceConfig};
pub use context::{ProtectedOutcome, ProtectedRequest, ResilienceContext, ServedFrom};
pub use error::{BakameError, BakameResult};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use store::{KeyValueStore, MemoryStore, StoreProvider};
