//! Per-service circuit breaker profiles.
//!
//! File-friendly form (millisecond integers) of
//! [`crate::resilience::CircuitBreakerConfig`]. Unregistered service names use
//! `default_config`.

use super::error::{ConfigResult, ConfigurationError};
use crate::constants::services;
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Circuit breaker settings for one upstream service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerServiceConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerServiceConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for CircuitBreakerServiceConfig {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout_ms: config.reset_timeout.as_millis() as u64,
            request_timeout_ms: config.request_timeout.as_millis() as u64,
            half_open_max_calls: config.half_open_max_calls,
        }
    }
}

impl CircuitBreakerServiceConfig {
    /// Convert to the resilience module's format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            half_open_max_calls: self.half_open_max_calls,
        }
    }
}

/// Circuit breaker configuration for every known service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    /// Profile for service names without an entry in `service_configs`
    pub default_config: CircuitBreakerServiceConfig,

    /// Named service profiles
    pub service_configs: HashMap<String, CircuitBreakerServiceConfig>,
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        let llm = CircuitBreakerServiceConfig::from(&CircuitBreakerConfig::for_llm_api());
        let external = CircuitBreakerServiceConfig::from(&CircuitBreakerConfig::for_external_api());
        let media =
            CircuitBreakerServiceConfig::from(&CircuitBreakerConfig::for_media_generation());
        let cache = CircuitBreakerServiceConfig::from(&CircuitBreakerConfig::for_cache_backend());

        let service_configs = HashMap::from([
            (services::OPENAI.to_string(), llm),
            (services::WEATHER.to_string(), external.clone()),
            (services::WEB_SEARCH.to_string(), external),
            (services::IMAGE_GENERATION.to_string(), media.clone()),
            (services::VIDEO_GENERATION.to_string(), media),
            (services::CACHE_BACKEND.to_string(), cache),
        ]);

        Self {
            default_config: CircuitBreakerServiceConfig::default(),
            service_configs,
        }
    }
}

impl CircuitBreakersConfig {
    /// Get the configuration for a specific service
    pub fn config_for_service(&self, service_name: &str) -> CircuitBreakerServiceConfig {
        self.service_configs
            .get(service_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.default_config
            .to_resilience_config()
            .validate()
            .map_err(|reason| {
                ConfigurationError::validation_error(format!(
                    "circuit_breakers.default_config: {reason}"
                ))
            })?;

        for (service, config) in &self.service_configs {
            config.to_resilience_config().validate().map_err(|reason| {
                ConfigurationError::validation_error(format!(
                    "circuit_breakers.service_configs.{service}: {reason}"
                ))
            })?;
        }
        Ok(())
    }
}
