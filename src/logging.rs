//! # Structured Logging Module
//!
//! Environment-aware console logging built on `tracing-subscriber`.
//! Production emits JSON lines; development and test use the human-readable
//! formatter. `RUST_LOG` always wins over the environment-derived level.

use crate::config::Environment;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging for the detected environment
pub fn init_structured_logging() {
    init_structured_logging_for(Environment::detect());
}

/// Initialize structured logging for an explicit environment
///
/// Safe to call more than once; only the first call installs a subscriber and
/// an already-installed global subscriber is left untouched.
pub fn init_structured_logging_for(environment: Environment) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(environment)));

        let layer = if environment == Environment::Production {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            environment = %environment,
            pid = std::process::id(),
            "Structured logging initialized"
        );
    });
}

/// Default filter directive for an environment
fn log_level(environment: Environment) -> &'static str {
    match environment {
        Environment::Production => "info",
        Environment::Test => "debug",
        Environment::Development => "debug",
    }
}

/// Log a failure of the substrate itself (store outage, serialization failure)
///
/// These are never surfaced to callers, so the log line is the only record.
pub fn log_substrate_failure(component: &str, operation: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        substrate_failure = true,
        "Resilience substrate failure (degrading gracefully)"
    );
}
