//! Circuit breaker guarding window-store access.
//!
//! A struggling store must not slow every admission down to its timeout.
//! After enough consecutive store faults the circuit opens and the evaluator
//! stops calling the store at all, admitting requests immediately (fail
//! open); after a recovery timeout one probe attempt is let through to test
//! whether the store is back.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Store is healthy; every admission talks to it
    Closed = 0,
    /// Store is considered down; admissions skip it and fail open
    Open = 1,
    /// Probing whether the store has recovered
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed, // Default to closed for invalid values
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive store faults before the circuit opens
    pub failure_threshold: u32,
    /// How long to skip the store before probing it again
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free breaker shared by every admission task.
///
/// State lives in atomics; transitions use compare-exchange so concurrent
/// tasks agree on who moves the circuit to half-open. Recovery timing uses a
/// process-local monotonic epoch, deliberately independent of the injected
/// wall clock: a simulated or skewed wall clock must not reopen a healthy
/// circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_nanos: AtomicU64,
    config: CircuitBreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether the next store round-trip should be attempted.
    ///
    /// Returns `false` while the circuit is open and inside the recovery
    /// timeout; the caller then skips the store and fails open. Once the
    /// timeout elapses, exactly one caller wins the transition to half-open
    /// and probes the store.
    pub fn allow_attempt(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = Instant::now();
                let last_failure = self.last_failure_time();

                if now.duration_since(last_failure) >= self.config.recovery_timeout {
                    let result = self.state.compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    result.is_ok() || self.state() == CircuitState::HalfOpen
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful store round-trip.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                // Probe succeeded, close the circuit
                self.consecutive_failures.store(0, Ordering::Release);
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a store fault.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        let nanos = Instant::now()
            .duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_nanos.store(nanos, Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                // Probe failed, reopen
                self.state
                    .store(CircuitState::Open as u8, Ordering::Release);
            }
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold as u64 {
                    self.state
                        .store(CircuitState::Open as u8, Ordering::Release);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn last_failure_time(&self) -> Instant {
        let nanos = self.last_failure_nanos.load(Ordering::Acquire);
        self.epoch + Duration::from_nanos(nanos)
    }

    /// Get the number of consecutive store faults.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Force the circuit closed and clear the fault count.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable circuit breaker reference.
pub type SharedCircuitBreaker = Arc<CircuitBreaker>;
