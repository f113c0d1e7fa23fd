//! Key-value store error types

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Failed to connect to the store backend
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    /// Store operation timed out
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// Operation applied to a value of the wrong type (e.g. INCR on text)
    #[error("Store type mismatch: {0}")]
    TypeMismatch(String),

    /// Backend does not implement this operation
    #[error("Store operation not supported by {provider}: {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// Generic backend error
    #[error("Store backend error: {0}")]
    BackendError(String),
}

impl StoreError {
    pub fn unsupported(provider: &'static str, operation: &'static str) -> Self {
        Self::Unsupported {
            provider,
            operation,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
