//! Rate limiter error types

use crate::config::ConfigurationError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while building or administering a rate limiter
///
/// Request-path checks never return these; store failures there fail open.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Quotas or algorithm choice are unusable
    #[error("Invalid rate limit configuration: {0}")]
    Configuration(String),

    /// Administrative operation could not reach the store
    #[error("Rate limit store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ConfigurationError> for RateLimitError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Result type for rate limiter construction and administration
pub type RateLimitResult<T> = Result<T, RateLimitError>;
