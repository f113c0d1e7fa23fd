//! Cache error types

use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur inside the cache layer
///
/// The layer itself never returns these from `read`, `write` or
/// `invalidate`; they are logged and counted. They surface from key
/// derivation and from the crate-level error conversion.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backing store failed
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    /// Failed to serialize a value or key arguments
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Stored value could not be decoded into the requested type
    #[error("Cache deserialization error for '{key}': {reason}")]
    DeserializationError { key: String, reason: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
