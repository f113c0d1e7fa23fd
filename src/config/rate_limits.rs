//! Rate limit quotas per endpoint and identity class.

use super::error::{ConfigResult, ConfigurationError};
use crate::constants::endpoints;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Longest accepted rate limit window (one day)
pub const MAX_WINDOW_SECONDS: u64 = 86_400;

/// Request budget over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Quota {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn window_millis(&self) -> u64 {
        self.window_seconds.saturating_mul(1000)
    }

    /// Requests allowed per second, used to compare quotas with different windows
    fn rate(&self) -> f64 {
        self.max_requests as f64 / self.window_seconds as f64
    }
}

/// Quotas for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPolicy {
    pub anonymous: Quota,
    pub authenticated: Quota,
}

impl EndpointPolicy {
    pub const fn new(anonymous: Quota, authenticated: Quota) -> Self {
        Self {
            anonymous,
            authenticated,
        }
    }

    pub fn quota(&self, is_authenticated: bool) -> Quota {
        if is_authenticated {
            self.authenticated
        } else {
            self.anonymous
        }
    }

    fn validate(&self, endpoint: &str) -> ConfigResult<()> {
        for (class, quota) in [
            ("anonymous", self.anonymous),
            ("authenticated", self.authenticated),
        ] {
            if quota.max_requests == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limits.endpoints.{endpoint}.{class}.max_requests"),
                    0,
                    "must be greater than 0",
                ));
            }
            if quota.window_seconds == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limits.endpoints.{endpoint}.{class}.window_seconds"),
                    0,
                    "must be greater than 0",
                ));
            }
            if quota.window_seconds > MAX_WINDOW_SECONDS {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limits.endpoints.{endpoint}.{class}.window_seconds"),
                    quota.window_seconds,
                    format!("must not exceed {MAX_WINDOW_SECONDS} seconds"),
                ));
            }
        }

        // Both the burst size and the sustained rate must be at least the anonymous ones
        if self.authenticated.max_requests < self.anonymous.max_requests
            || self.authenticated.rate() < self.anonymous.rate()
        {
            return Err(ConfigurationError::validation_error(format!(
                "rate_limits.endpoints.{endpoint}: authenticated quota ({}/{}s) must not be lower than anonymous quota ({}/{}s)",
                self.authenticated.max_requests,
                self.authenticated.window_seconds,
                self.anonymous.max_requests,
                self.anonymous.window_seconds,
            )));
        }
        Ok(())
    }
}

/// Which counting algorithm the limiter should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithmPreference {
    /// Sliding window when the store supports ordered sets, fixed window otherwise
    #[default]
    Auto,
    SlidingWindow,
    FixedWindow,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithmPreference,

    /// Skip limiting entirely when running in the development environment
    pub development_bypass: bool,

    /// Endpoint name to policy; must contain `"default"`
    pub endpoints: HashMap<String, EndpointPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let endpoints = HashMap::from([
            (
                endpoints::CHAT.to_string(),
                EndpointPolicy::new(Quota::new(30, 60), Quota::new(100, 60)),
            ),
            (
                endpoints::UPLOAD.to_string(),
                EndpointPolicy::new(Quota::new(5, 60), Quota::new(20, 60)),
            ),
            (
                endpoints::RAG.to_string(),
                EndpointPolicy::new(Quota::new(20, 60), Quota::new(60, 60)),
            ),
            (
                endpoints::MEMORY.to_string(),
                EndpointPolicy::new(Quota::new(30, 60), Quota::new(100, 60)),
            ),
            (
                endpoints::TOOLS.to_string(),
                EndpointPolicy::new(Quota::new(20, 60), Quota::new(60, 60)),
            ),
            (
                endpoints::IMAGE_GENERATION.to_string(),
                EndpointPolicy::new(Quota::new(3, 300), Quota::new(10, 300)),
            ),
            (
                endpoints::DEFAULT.to_string(),
                EndpointPolicy::new(Quota::new(60, 60), Quota::new(120, 60)),
            ),
        ]);

        Self {
            algorithm: RateLimitAlgorithmPreference::Auto,
            development_bypass: false,
            endpoints,
        }
    }
}

impl RateLimitConfig {
    /// Policy for an endpoint, falling back to the `default` policy
    pub fn policy_for(&self, endpoint: &str) -> Option<&EndpointPolicy> {
        self.endpoints
            .get(endpoint)
            .or_else(|| self.endpoints.get(endpoints::DEFAULT))
    }

    /// Insert or replace the policy for an endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>, policy: EndpointPolicy) -> Self {
        self.endpoints.insert(endpoint.into(), policy);
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.endpoints.contains_key(endpoints::DEFAULT) {
            return Err(ConfigurationError::missing_required_field(
                format!("endpoints.{}", endpoints::DEFAULT),
                "rate_limits",
            ));
        }
        for (endpoint, policy) in &self.endpoints {
            policy.validate(endpoint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limits_are_valid() {
        let config = RateLimitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.policy_for("chat").map(|p| p.anonymous),
            Some(Quota::new(30, 60))
        );
    }

    #[test]
    fn test_unknown_endpoint_uses_default_policy() {
        let config = RateLimitConfig::default();
        let policy = config.policy_for("not-configured").copied();
        assert_eq!(policy, config.endpoints.get("default").copied());
    }

    #[test]
    fn test_missing_default_policy_rejected() {
        let mut config = RateLimitConfig::default();
        config.endpoints.remove("default");
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { .. }
        ));
    }

    #[test]
    fn test_authenticated_quota_must_not_be_lower() {
        let config = RateLimitConfig::default().with_endpoint(
            "chat",
            EndpointPolicy::new(Quota::new(50, 60), Quota::new(10, 60)),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_smaller_authenticated_burst_rejected() {
        // 10 per 10s is a higher rate than 30 per 60s but a smaller burst
        let config = RateLimitConfig::default().with_endpoint(
            "burst",
            EndpointPolicy::new(Quota::new(30, 60), Quota::new(10, 10)),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_slower_authenticated_rate_rejected() {
        let config = RateLimitConfig::default().with_endpoint(
            "slow",
            EndpointPolicy::new(Quota::new(30, 60), Quota::new(40, 600)),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_longer_authenticated_window_with_higher_rate_accepted() {
        let config = RateLimitConfig::default().with_endpoint(
            "chat",
            EndpointPolicy::new(Quota::new(30, 60), Quota::new(120, 120)),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let config = RateLimitConfig::default().with_endpoint(
            "archive",
            EndpointPolicy::new(
                Quota::new(1, 20_000_000_000_000_000),
                Quota::new(1, 20_000_000_000_000_000),
            ),
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
        assert!(err.to_string().contains("window_seconds"));

        let one_day = RateLimitConfig::default().with_endpoint(
            "archive",
            EndpointPolicy::new(
                Quota::new(1, MAX_WINDOW_SECONDS),
                Quota::new(1, MAX_WINDOW_SECONDS),
            ),
        );
        assert!(one_day.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RateLimitConfig::default().with_endpoint(
            "broken",
            EndpointPolicy::new(Quota::new(1, 0), Quota::new(1, 60)),
        );
        assert!(config.validate().is_err());
    }
}
