//! # Circuit Breaker Implementation
//!
//! Classic three-state circuit breaker protecting stage execution: Closed
//! (normal operation), Open (failing fast for a cooldown window), and
//! HalfOpen (probing recovery after the cooldown).

use crate::constants::system;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited probe calls allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Configuration for one breaker instance.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a probe
    pub cooldown: Duration,
    /// Probe successes required in half-open before closing again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: system::CIRCUIT_FAILURE_THRESHOLD,
            cooldown: system::CIRCUIT_COOLDOWN,
            success_threshold: 1,
        }
    }
}

/// Rolling metrics for one breaker.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls until the cooldown elapses
    #[error("Circuit breaker is open for {component}, retry in {remaining_cooldown:?}")]
    CircuitOpen {
        component: String,
        remaining_cooldown: Duration,
    },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Core circuit breaker with atomic state management.
///
/// One instance guards one stage function across every in-flight request;
/// counters are shared, so increments and resets must happen under the
/// metrics lock with the state byte updated atomically.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and error messages
    name: String,
    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,
    config: CircuitBreakerConfig,
    metrics: Arc<Mutex<CircuitBreakerMetrics>>,
    /// Time when circuit was opened, for cooldown calculations
    opened_at: Arc<Mutex<Option<Instant>>>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cooldown_secs = config.cooldown.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            metrics: Arc::new(Mutex::new(CircuitBreakerMetrics::default())),
            opened_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute an operation with circuit breaker protection.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(remaining) = self.rejection_cooldown().await {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                remaining_cooldown: remaining,
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration).await,
            Err(_) => self.record_failure(duration).await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Returns the remaining cooldown when the call must be rejected, or
    /// `None` when the call may proceed (transitioning to half-open if the
    /// cooldown has elapsed).
    async fn rejection_cooldown(&self) -> Option<Duration> {
        match self.state() {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let opened_at = self.opened_at.lock().await;
                match *opened_at {
                    Some(opened_time) => {
                        let elapsed = opened_time.elapsed();
                        if elapsed >= self.config.cooldown {
                            drop(opened_at);
                            self.transition_to_half_open().await;
                            None
                        } else {
                            Some(self.config.cooldown - elapsed)
                        }
                    }
                    None => {
                        // Open without a timestamp should not happen; allow the call
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        None
                    }
                }
            }
            CircuitState::HalfOpen => {
                let metrics = self.metrics.lock().await;
                if metrics.half_open_calls < self.config.success_threshold as u64 {
                    None
                } else {
                    Some(Duration::ZERO)
                }
            }
        }
    }

    async fn record_success(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;
        metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                metrics.half_open_calls += 1;
                if metrics.half_open_calls >= self.config.success_threshold as u64 {
                    drop(metrics);
                    self.transition_to_closed().await;
                }
            }
            CircuitState::Closed => {
                // Success resets the consecutive-failure counter
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;
        metrics.total_duration += duration;

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🔴 Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                metrics.consecutive_failures += 1;
                if metrics.consecutive_failures >= self.config.failure_threshold as u64 {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open immediately re-opens for a fresh cooldown
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {}
        }
    }

    async fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;
        metrics.half_open_calls = 0;

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = None;

        info!(
            component = %self.name,
            total_calls = metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = Some(Instant::now());

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_calls = 0;

        error!(
            component = %self.name,
            consecutive_failures = metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            cooldown_secs = self.config.cooldown.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    async fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.half_open_calls = 0;

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics.lock().await.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
