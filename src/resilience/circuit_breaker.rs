//! # Circuit Breaker Implementation
//!
//! Per-service fault isolation with three states: Closed (normal
//! operation), Open (serving fallbacks without calling upstream) and
//! HalfOpen (admitting a limited number of trial calls).
//!
//! Open -> HalfOpen is evaluated lazily whenever the breaker is consulted;
//! no background timer runs. State lives in process memory only.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lock-free counters for circuit breaker metrics
#[derive(Debug, Default)]
struct AtomicCircuitBreakerMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    timeout_count: AtomicU64,
    rejected_count: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCircuitBreakerMetrics {
    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, reason: &FailureReason, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if reason.is_timeout() {
            self.timeout_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_rejection(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, state: CircuitState) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, average_duration) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                Duration::from_nanos(total_duration_nanos / total_calls),
            )
        } else {
            (0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count,
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(total_duration_nanos),
            current_state: state,
            failure_rate,
            average_duration,
        }
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - calls are short-circuited to the fallback
    Open,
    /// Testing recovery - limited trial calls are allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Why a protected call counted as a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The operation returned an error
    Error { message: String },
    /// The operation exceeded the request timeout
    Timeout { after_ms: u64 },
}

impl FailureReason {
    pub fn error(message: impl fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { message } => write!(f, "error: {message}"),
            Self::Timeout { after_ms } => write!(f, "timeout after {after_ms}ms"),
        }
    }
}

/// Most recent failure of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub reason: FailureReason,
}

/// Errors returned by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or half-open at capacity), call not attempted
    #[error("Circuit breaker is open for {service}")]
    CircuitOpen { service: String },

    /// Operation exceeded the request timeout and was recorded as a failure
    #[error("Operation timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

#[derive(Debug)]
struct BreakerRecord {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    last_failure: Option<FailureRecord>,
    half_open_in_flight: u32,
    /// Bumped on every transition into HalfOpen so stale trial permits are ignored
    half_open_generation: u64,
}

impl BreakerRecord {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            opened_at_wall: None,
            last_failure: None,
            half_open_in_flight: 0,
            half_open_generation: 0,
        }
    }
}

/// Admission to run one protected call
///
/// Trial permits give their half-open slot back when dropped, including when
/// the caller's future is cancelled mid-call.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial_generation: Option<u64>,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.trial_generation {
            let mut record = self.breaker.record.lock();
            if record.state == CircuitState::HalfOpen && record.half_open_generation == generation
            {
                record.half_open_in_flight = record.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}

/// Circuit breaker for one upstream service
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Service name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    /// State machine; held only for short, non-async critical sections
    record: Mutex<BreakerRecord>,

    metrics: AtomicCircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new, closed circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            service = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            record: Mutex::new(BreakerRecord::closed()),
            metrics: AtomicCircuitBreakerMetrics::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state; may move an expired Open circuit to HalfOpen
    pub fn state(&self) -> CircuitState {
        let mut record = self.record.lock();
        self.refresh(&mut record);
        record.state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// The operation runs under the configured request timeout. Errors and
    /// timeouts are recorded as failures and reported through the error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let Some(_permit) = self.admit() else {
            self.metrics.record_rejection();
            debug!(service = %self.name, "Circuit open, call short-circuited");
            return Err(CircuitBreakerError::CircuitOpen {
                service: self.name.clone(),
            });
        };

        let request_timeout = self.config.request_timeout;
        let start = Instant::now();
        let outcome = tokio::time::timeout(request_timeout, operation()).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                self.on_success(duration);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure(FailureReason::error(&e), duration);
                Err(CircuitBreakerError::OperationFailed(e))
            }
            Err(_) => {
                self.on_failure(FailureReason::timeout(request_timeout), duration);
                Err(CircuitBreakerError::Timeout {
                    after: request_timeout,
                })
            }
        }
    }

    /// Execute an operation, returning `fallback` whenever it cannot produce
    /// a value (open circuit, error or timeout)
    pub async fn execute<F, Fut, T, E>(&self, operation: F, fallback: T) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(e) => {
                debug!(service = %self.name, reason = %e, "Serving fallback");
                fallback
            }
        }
    }

    /// Check whether a call would currently be admitted
    ///
    /// Use this for pre-flight checks when recording outcomes manually.
    pub fn should_allow(&self) -> bool {
        let mut record = self.record.lock();
        self.refresh(&mut record);
        match record.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => record.half_open_in_flight < self.config.half_open_max_calls,
        }
    }

    /// Manually record a successful operation
    pub fn record_success(&self) {
        self.on_success(Duration::ZERO);
    }

    /// Manually record a failed operation
    pub fn record_failure(&self, reason: FailureReason) {
        self.on_failure(reason, Duration::ZERO);
    }

    /// Force the circuit closed and zero its counters
    pub fn reset(&self) {
        let mut record = self.record.lock();
        *record = BreakerRecord {
            half_open_generation: record.half_open_generation,
            ..BreakerRecord::closed()
        };
        info!(service = %self.name, "Circuit breaker reset");
    }

    /// Force the circuit open (for emergency situations)
    pub fn force_open(&self) {
        warn!(service = %self.name, "Circuit breaker forced open");
        let mut record = self.record.lock();
        self.transition_to_open(&mut record);
    }

    /// Most recent failure, if any since the last reset
    pub fn last_failure(&self) -> Option<FailureRecord> {
        self.record.lock().last_failure.clone()
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let mut record = self.record.lock();
        self.refresh(&mut record);
        CircuitBreakerStatus {
            service: self.name.clone(),
            state: record.state,
            consecutive_failures: record.consecutive_failures,
            consecutive_successes: record.consecutive_successes,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            opened_at: record.opened_at_wall,
            last_failure: record.last_failure.clone(),
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics.snapshot(self.state())
    }

    /// Check if circuit is healthy (closed with a low failure rate)
    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }

    fn admit(&self) -> Option<CallPermit<'_>> {
        let mut record = self.record.lock();
        self.refresh(&mut record);
        match record.state {
            CircuitState::Closed => Some(CallPermit {
                breaker: self,
                trial_generation: None,
            }),
            CircuitState::Open => None,
            CircuitState::HalfOpen => {
                if record.half_open_in_flight >= self.config.half_open_max_calls {
                    return None;
                }
                record.half_open_in_flight += 1;
                Some(CallPermit {
                    breaker: self,
                    trial_generation: Some(record.half_open_generation),
                })
            }
        }
    }

    /// Apply the time-triggered Open -> HalfOpen transition
    fn refresh(&self, record: &mut BreakerRecord) {
        if record.state != CircuitState::Open {
            return;
        }
        let elapsed = record
            .opened_at
            .map_or(self.config.reset_timeout, |opened| opened.elapsed());
        if elapsed >= self.config.reset_timeout {
            self.transition_to_half_open(record);
        }
    }

    fn on_success(&self, duration: Duration) {
        self.metrics.record_success(duration);
        debug!(
            service = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        let mut record = self.record.lock();
        self.refresh(&mut record);
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                record.consecutive_successes += 1;
                if record.consecutive_successes >= self.config.success_threshold {
                    self.transition_to_closed(&mut record);
                }
            }
            CircuitState::Open => {
                debug!(service = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    fn on_failure(&self, reason: FailureReason, duration: Duration) {
        self.metrics.record_failure(&reason, duration);
        warn!(
            service = %self.name,
            reason = %reason,
            duration_ms = duration.as_millis() as u64,
            "Operation failed"
        );

        let mut record = self.record.lock();
        self.refresh(&mut record);
        record.last_failure = Some(FailureRecord {
            at: Utc::now(),
            reason,
        });
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures += 1;
                if record.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut record);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure while probing reopens immediately
                record.consecutive_failures += 1;
                self.transition_to_open(&mut record);
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self, record: &mut BreakerRecord) {
        record.state = CircuitState::Closed;
        record.consecutive_failures = 0;
        record.consecutive_successes = 0;
        record.opened_at = None;
        record.opened_at_wall = None;
        record.half_open_in_flight = 0;

        info!(service = %self.name, "Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self, record: &mut BreakerRecord) {
        record.state = CircuitState::Open;
        record.consecutive_successes = 0;
        record.opened_at = Some(Instant::now());
        record.opened_at_wall = Some(Utc::now());
        record.half_open_in_flight = 0;

        error!(
            service = %self.name,
            consecutive_failures = record.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "Circuit breaker opened (serving fallbacks)"
        );
    }

    fn transition_to_half_open(&self, record: &mut BreakerRecord) {
        record.state = CircuitState::HalfOpen;
        record.consecutive_successes = 0;
        record.half_open_in_flight = 0;
        record.half_open_generation += 1;

        info!(
            service = %self.name,
            success_threshold = self.config.success_threshold,
            half_open_max_calls = self.config.half_open_max_calls,
            "Circuit breaker half-open (testing recovery)"
        );
    }
}
