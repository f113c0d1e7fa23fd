//! # Cache Module
//!
//! Cache-aside helper with deterministic key derivation.
//!
//! ```text
//! handler ──derive_key──► CacheLayer::with_cache(key, ttl, op)
//!                            │ hit  ─► cached value
//!                            └ miss ─► op() ─► write on success ─► value
//! ```
//!
//! Best-effort throughout: store and serialization failures are logged and
//! counted in [`CacheStatsSnapshot::errors`], never propagated.

pub mod errors;
pub mod key;
pub mod layer;
pub mod stats;

pub use errors::{CacheError, CacheResult};
pub use key::{canonical_json, derive_key, derive_key_for, namespace_pattern};
pub use layer::CacheLayer;
pub use stats::{CacheStats, CacheStatsSnapshot};
