//! Error types for the Bakame resilience substrate.
//!
//! Each concern carries its own error enum (`StoreError`, `CacheError`,
//! `ConfigurationError`, `CircuitBreakerError`, `RateLimitError`);
//! `BakameError` is the crate-level umbrella used by the composition root.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::rate_limit::RateLimitError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakameError {
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Rate limit error: {0}")]
    RateLimitError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for BakameError {
    fn from(error: StoreError) -> Self {
        BakameError::StoreError(error.to_string())
    }
}

impl From<CacheError> for BakameError {
    fn from(error: CacheError) -> Self {
        BakameError::CacheError(error.to_string())
    }
}

impl From<ConfigurationError> for BakameError {
    fn from(error: ConfigurationError) -> Self {
        BakameError::ConfigurationError(error.to_string())
    }
}

impl From<RateLimitError> for BakameError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Configuration(message) => BakameError::ConfigurationError(message),
            other => BakameError::RateLimitError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BakameError {
    fn from(error: serde_json::Error) -> Self {
        BakameError::CacheError(format!("JSON serialization error: {error}"))
    }
}

pub type BakameResult<T> = std::result::Result<T, BakameError>;
