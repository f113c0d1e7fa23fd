//! # Rate Limiting Module
//!
//! Per-endpoint, per-identity request quotas backed by the shared
//! key-value store. Scope keys are `ratelimit:<endpoint>:<identifier>`.
//!
//! - **Sliding window** (stores with ordered sets): one atomic
//!   trim + add + count batch per request
//! - **Fixed window** (other stores): atomic `incr` with the window as expiry
//! - **Fail open**: a store outage never turns into a rejection

pub mod decision;
pub mod errors;
pub mod identity;
pub mod limiter;

pub use decision::RateLimitDecision;
pub use errors::{RateLimitError, RateLimitResult};
pub use identity::{client_identifier, user_identifier};
pub use limiter::{RateLimitAlgorithm, RateLimiter};
