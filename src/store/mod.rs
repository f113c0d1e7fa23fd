//! # Key-Value Store Module
//!
//! TTL-capable key-value storage shared by the cache layer and the rate
//! limiter.
//!
//! ## Architecture
//!
//! ```text
//! KeyValueStore (trait)          <- object safe, injected as Arc<dyn KeyValueStore>
//!   └── StoreProvider (enum)     <- built from configuration
//!         ├── Redis(RedisStore)  <- ConnectionManager-based async Redis (feature store-redis)
//!         └── Memory(MemoryStore)<- DashMap-backed, single process only
//! ```
//!
//! ## Design Decisions
//!
//! - **Lazy expiry**: reads never observe an expired entry, sweeping only bounds memory
//! - **Capability flags**: ordered-set support and key enumeration are declared, not probed
//! - **Graceful degradation**: Redis failure at startup falls back to memory
//! - **SCAN for patterns**: non-blocking key iteration (never uses KEYS)

pub mod errors;
pub mod provider;
pub mod providers;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use provider::StoreProvider;
pub use providers::MemoryStore;
pub use traits::{KeyValueStore, StoreCapabilities, WindowSnapshot};

#[cfg(feature = "store-redis")]
pub use providers::RedisStore;
