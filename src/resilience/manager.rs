//! # Circuit Breaker Registry
//!
//! One circuit breaker per upstream service name, created lazily from the
//! per-service configuration the first time an outcome is recorded or a call
//! is attempted. Queries about unknown services never create a breaker.

use crate::config::{CircuitBreakersConfig, ConfigResult, ConfigurationError};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics,
    CircuitBreakerStatus, FailureReason, SystemCircuitBreakerMetrics,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of circuit breakers keyed by service name
///
/// Cloning is cheap; clones share the same breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    config: Arc<CircuitBreakersConfig>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakersConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakersConfig) -> Self {
        info!(
            configured_services = config.service_configs.len(),
            "Circuit breaker registry initialized"
        );
        Self {
            breakers: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    /// Settings a new breaker for `service` would receive
    pub fn config_for(&self, service: &str) -> CircuitBreakerConfig {
        self.config.config_for_service(service).to_resilience_config()
    }

    /// Get or create the circuit breaker for a service
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return Arc::clone(existing.value());
        }

        let breaker = self
            .breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                info!(service = service, "Created new circuit breaker");
                Arc::new(CircuitBreaker::new(service, self.config_for(service)))
            });
        Arc::clone(breaker.value())
    }

    /// Register a breaker with explicit settings, replacing any existing one
    pub fn register(
        &self,
        service: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<Arc<CircuitBreaker>> {
        config.validate().map_err(|reason| {
            ConfigurationError::validation_error(format!("circuit breaker '{service}': {reason}"))
        })?;

        let breaker = Arc::new(CircuitBreaker::new(service, config));
        if self
            .breakers
            .insert(service.to_string(), Arc::clone(&breaker))
            .is_some()
        {
            warn!(service = service, "Replaced existing circuit breaker");
        }
        Ok(breaker)
    }

    fn existing(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(service)
            .map(|breaker| Arc::clone(breaker.value()))
    }

    /// Run `operation` for `service`, returning `fallback` when the circuit
    /// is open or the operation fails or times out
    pub async fn execute<F, Fut, T, E>(&self, service: &str, operation: F, fallback: T) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.breaker(service).execute(operation, fallback).await
    }

    /// Run `operation` for `service`, reporting why no value was produced
    pub async fn call<F, Fut, T, E>(
        &self,
        service: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.breaker(service).call(operation).await
    }

    pub fn record_success(&self, service: &str) {
        self.breaker(service).record_success();
    }

    pub fn record_failure(&self, service: &str, reason: FailureReason) {
        self.breaker(service).record_failure(reason);
    }

    /// Unknown services are closed
    pub fn is_open(&self, service: &str) -> bool {
        self.existing(service)
            .is_some_and(|breaker| breaker.is_open())
    }

    pub fn is_closed(&self, service: &str) -> bool {
        self.existing(service)
            .map_or(true, |breaker| breaker.is_closed())
    }

    /// Status of a service; unknown services report a fresh closed record
    pub fn get_status(&self, service: &str) -> CircuitBreakerStatus {
        match self.existing(service) {
            Some(breaker) => breaker.status(),
            None => CircuitBreaker::new(service, self.config_for(service)).status(),
        }
    }

    /// Status of every breaker created so far, ordered by service name
    pub fn get_all_statuses(&self) -> BTreeMap<String, CircuitBreakerStatus> {
        self.snapshot()
            .into_iter()
            .map(|(name, breaker)| (name, breaker.status()))
            .collect()
    }

    /// Force a service's circuit closed and zero its counters
    ///
    /// Returns `false` if the service has no breaker yet.
    pub fn reset(&self, service: &str) -> bool {
        match self.existing(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        warn!("Resetting all circuit breakers");
        for (_, breaker) in self.snapshot() {
            breaker.reset();
        }
    }

    pub fn force_open(&self, service: &str) {
        self.breaker(service).force_open();
    }

    /// Drop a service's breaker entirely
    pub fn remove(&self, service: &str) -> bool {
        let removed = self.breakers.remove(service).is_some();
        if removed {
            info!(
                service = service,
                remaining_count = self.breakers.len(),
                "Removed circuit breaker"
            );
        }
        removed
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    pub fn metrics(&self, service: &str) -> Option<CircuitBreakerMetrics> {
        self.existing(service).map(|breaker| breaker.metrics())
    }

    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for (name, breaker) in self.snapshot() {
            system_metrics.add_circuit_breaker(name, breaker.metrics());
        }
        system_metrics
    }

    /// Share of healthy breakers (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        self.system_metrics().health_score()
    }

    /// Clone out the breakers so no map guard is held while they are locked
    fn snapshot(&self) -> Vec<(String, Arc<CircuitBreaker>)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
