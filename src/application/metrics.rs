//! Observability metrics for admission control.
//!
//! Provides counters about admission behavior for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Counters are bumped throughout the admission path and can be queried at
/// any time for observability. Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total requests admitted
    requests_allowed: AtomicU64,
    /// Total requests denied by some tier
    requests_denied: AtomicU64,
    /// Store faults absorbed by failing open
    store_failures: AtomicU64,
    /// Violation records handed to the sink
    violations_dispatched: AtomicU64,
    /// Suspicious-IP escalations written
    ips_flagged: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_allowed: AtomicU64::new(0),
                requests_denied: AtomicU64::new(0),
                store_failures: AtomicU64::new(0),
                violations_dispatched: AtomicU64::new(0),
                ips_flagged: AtomicU64::new(0),
            }),
        }
    }

    /// Record an admitted request.
    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a denied request.
    pub(crate) fn record_denied(&self) {
        self.inner.requests_denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a store fault absorbed by failing open.
    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a violation handed to the sink.
    pub(crate) fn record_violation_dispatched(&self) {
        self.inner
            .violations_dispatched
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a suspicious-IP escalation.
    pub(crate) fn record_ip_flagged(&self) {
        self.inner.ips_flagged.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests admitted.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Total requests denied.
    pub fn requests_denied(&self) -> u64 {
        self.inner.requests_denied.load(Ordering::Relaxed)
    }

    /// Total store faults absorbed by failing open.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Total violation records handed to the sink.
    pub fn violations_dispatched(&self) -> u64 {
        self.inner.violations_dispatched.load(Ordering::Relaxed)
    }

    /// Total suspicious-IP escalations written.
    pub fn ips_flagged(&self) -> u64 {
        self.inner.ips_flagged.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_denied: self.requests_denied(),
            store_failures: self.store_failures(),
            violations_dispatched: self.violations_dispatched(),
            ips_flagged: self.ips_flagged(),
        }
    }

    /// Reset all counters to zero.
    ///
    /// Useful for testing or when starting a new monitoring period.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_denied.store(0, Ordering::Relaxed);
        self.inner.store_failures.store(0, Ordering::Relaxed);
        self.inner.violations_dispatched.store(0, Ordering::Relaxed);
        self.inner.ips_flagged.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of admission metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total requests admitted
    pub requests_allowed: u64,
    /// Total requests denied by some tier
    pub requests_denied: u64,
    /// Store faults absorbed by failing open
    pub store_failures: u64,
    /// Violation records handed to the sink
    pub violations_dispatched: u64,
    /// Suspicious-IP escalations written
    pub ips_flagged: u64,
}

impl MetricsSnapshot {
    /// Ratio of denied requests to total checked (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been checked.
    pub fn denial_rate(&self) -> f64 {
        let total = self.requests_allowed.saturating_add(self.requests_denied);
        if total == 0 {
            0.0
        } else {
            self.requests_denied as f64 / total as f64
        }
    }

    /// Total requests checked (allowed + denied).
    pub fn total_requests(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_denied)
    }
}
