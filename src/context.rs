//! # Resilience Context
//!
//! Composition root: builds the store, cache layer, rate limiter and circuit
//! breaker registry from one [`ResilienceConfig`] and hands them out as
//! shared handles. Also offers [`ResilienceContext::run_protected`], the
//! request-path composition of all three.

use crate::cache::{CacheLayer, CacheStatsSnapshot};
use crate::config::{Environment, ResilienceConfig};
use crate::error::BakameResult;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::resilience::CircuitBreakerRegistry;
use crate::store::{KeyValueStore, StoreProvider};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared resilience dependencies
pub struct ResilienceContext {
    /// Instance ID, included in startup logs
    pub context_id: Uuid,

    /// Configuration the context was built from
    pub config: Arc<ResilienceConfig>,

    /// Backing key-value store shared by the cache and the limiter
    pub store: Arc<dyn KeyValueStore>,

    pub cache: CacheLayer,

    pub rate_limiter: RateLimiter,

    pub circuit_breakers: CircuitBreakerRegistry,
}

impl fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("context_id", &self.context_id)
            .field("environment", &self.config.environment)
            .field("store", &self.store.provider_name())
            .field("cache", &self.cache)
            .field("rate_limiter", &self.rate_limiter)
            .field("circuit_breakers", &self.circuit_breakers.services())
            .finish()
    }
}

/// Inputs of one protected request
#[derive(Debug, Clone)]
pub struct ProtectedRequest {
    /// Rate limit policy name, e.g. `"chat"`
    pub endpoint: String,
    /// Client or user identifier the quota is tracked for
    pub identifier: String,
    pub is_authenticated: bool,
    /// Circuit breaker service name, e.g. `"openai"`
    pub service: String,
    /// Cache key and TTL when the result is cacheable
    pub cache: Option<(String, Duration)>,
}

impl ProtectedRequest {
    pub fn new(
        endpoint: impl Into<String>,
        identifier: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            identifier: identifier.into(),
            is_authenticated: false,
            service: service.into(),
            cache: None,
        }
    }

    pub fn authenticated(mut self, is_authenticated: bool) -> Self {
        self.is_authenticated = is_authenticated;
        self
    }

    pub fn cached(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some((key.into(), ttl));
        self
    }
}

/// Where a served value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Cache,
    Upstream,
    /// Circuit open, upstream failed or timed out
    Fallback,
}

/// Result of [`ResilienceContext::run_protected`]
#[derive(Debug, Clone)]
pub enum ProtectedOutcome<T> {
    /// Quota exhausted; nothing else was consulted
    Rejected(RateLimitDecision),
    Served {
        value: T,
        source: ServedFrom,
        decision: RateLimitDecision,
    },
}

impl<T> ProtectedOutcome<T> {
    pub fn decision(&self) -> &RateLimitDecision {
        match self {
            Self::Rejected(decision) => decision,
            Self::Served { decision, .. } => decision,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn source(&self) -> Option<ServedFrom> {
        match self {
            Self::Rejected(_) => None,
            Self::Served { source, .. } => Some(*source),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Rejected(_) => None,
            Self::Served { value, .. } => Some(value),
        }
    }
}

/// Point-in-time health of the substrate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceHealth {
    pub store_provider: String,
    pub store_healthy: bool,
    pub circuit_health_score: f64,
    pub open_circuits: Vec<String>,
    pub cache: CacheStatsSnapshot,
}

impl ResilienceContext {
    /// Build every component from configuration
    ///
    /// Store selection degrades to the in-memory store when the configured
    /// backend is unreachable; only invalid configuration is an error.
    pub async fn from_config(config: ResilienceConfig) -> BakameResult<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> =
            Arc::new(StoreProvider::from_config_graceful(&config.store).await);
        Self::with_store(config, store)
    }

    /// Build the components over an already constructed store
    pub fn with_store(config: ResilienceConfig, store: Arc<dyn KeyValueStore>) -> BakameResult<Self> {
        config.validate()?;

        let bypass =
            config.environment == Environment::Development && config.rate_limits.development_bypass;
        if config.rate_limits.development_bypass && !bypass {
            warn!(
                environment = %config.environment,
                "Rate limit bypass ignored outside development"
            );
        }

        let cache = CacheLayer::new(Arc::clone(&store), config.cache.clone());
        let rate_limiter =
            RateLimiter::new(Arc::clone(&store), config.rate_limits.clone())?.with_bypass(bypass);
        let circuit_breakers = CircuitBreakerRegistry::new(config.circuit_breakers.clone());

        let context_id = Uuid::new_v4();
        info!(
            context_id = %context_id,
            environment = %config.environment,
            store = store.provider_name(),
            distributed = store.capabilities().distributed,
            algorithm = ?rate_limiter.algorithm(),
            cache_enabled = cache.is_enabled(),
            "Resilience context initialized"
        );

        Ok(Self {
            context_id,
            config: Arc::new(config),
            store,
            cache,
            rate_limiter,
            circuit_breakers,
        })
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.circuit_breakers
    }

    /// Rate limit, then cache, then circuit breaker
    ///
    /// A rejected request touches neither the cache nor the upstream. Only
    /// values produced by the upstream are written to the cache; fallbacks
    /// never are.
    pub async fn run_protected<T, E, F, Fut>(
        &self,
        request: &ProtectedRequest,
        operation: F,
        fallback: T,
    ) -> ProtectedOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let decision = self
            .rate_limiter
            .check_rate_limit(
                &request.endpoint,
                &request.identifier,
                request.is_authenticated,
            )
            .await;
        if !decision.allowed {
            return ProtectedOutcome::Rejected(decision);
        }

        if let Some((key, _)) = &request.cache {
            if let Some(value) = self.cache.read::<T>(key).await {
                return ProtectedOutcome::Served {
                    value,
                    source: ServedFrom::Cache,
                    decision,
                };
            }
        }

        match self.circuit_breakers.call(&request.service, operation).await {
            Ok(value) => {
                if let Some((key, ttl)) = &request.cache {
                    self.cache.write(key, &value, *ttl).await;
                }
                ProtectedOutcome::Served {
                    value,
                    source: ServedFrom::Upstream,
                    decision,
                }
            }
            Err(e) => {
                debug!(
                    service = %request.service,
                    error = %e,
                    "Serving fallback"
                );
                ProtectedOutcome::Served {
                    value: fallback,
                    source: ServedFrom::Fallback,
                    decision,
                }
            }
        }
    }

    pub async fn health_check(&self) -> ResilienceHealth {
        let store_healthy = self.store.health_check().await.unwrap_or(false);
        let system = self.circuit_breakers.system_metrics();
        let open_circuits = self
            .circuit_breakers
            .get_all_statuses()
            .into_iter()
            .filter(|(_, status)| status.state == crate::resilience::CircuitState::Open)
            .map(|(service, _)| service)
            .collect();

        ResilienceHealth {
            store_provider: self.store.provider_name().to_string(),
            store_healthy,
            circuit_health_score: system.health_score(),
            open_circuits,
            cache: self.cache.stats(),
        }
    }
}
