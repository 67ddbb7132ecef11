//! Engine façade wiring the admission pipeline together.
//!
//! [`GatewayThrottle`] assembles the evaluator, abuse monitor and status
//! reporter around one shared store, clock, metrics tracker and circuit
//! breaker, and is the type most callers interact with. Construction goes
//! through [`GatewayThrottleBuilder`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::application::abuse::AbuseMonitor;
use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::evaluator::{AdmissionEvaluator, CheckRequest, DEFAULT_STORE_TIMEOUT};
use crate::application::metrics::{Metrics, MetricsSnapshot};
use crate::application::ports::{AbuseStore, Clock, StoreError, ViolationSink, WindowStore};
use crate::application::status::StatusReporter;
use crate::domain::{Decision, StatusReport, SuspiciousIpRecord, Tier, TierRegistry};
use crate::infrastructure::abuse_store::InMemoryAbuseStore;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::memory_store::InMemoryStore;
use crate::infrastructure::sink::TracingViolationSink;

/// Error returned when building a [`GatewayThrottle`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The store deadline must be non-zero.
    ZeroStoreTimeout,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroStoreTimeout => {
                write!(f, "store_timeout must be greater than zero")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for constructing a [`GatewayThrottle`].
pub struct GatewayThrottleBuilder {
    registry: TierRegistry,
    store: Option<Arc<dyn WindowStore>>,
    abuse_store: Option<Arc<dyn AbuseStore>>,
    sink: Option<Arc<dyn ViolationSink>>,
    clock: Option<Arc<dyn Clock>>,
    breaker_config: CircuitBreakerConfig,
    store_timeout: Duration,
}

impl GatewayThrottleBuilder {
    /// Set the tier configuration.
    pub fn with_registry(mut self, registry: TierRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the window store shared by all tiers.
    ///
    /// Defaults to an in-process [`InMemoryStore`]. Use `RedisWindowStore`
    /// (behind the `redis-storage` feature) when several processes must
    /// share windows.
    pub fn with_store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the suspicious-IP ledger.
    pub fn with_abuse_store(mut self, abuse_store: Arc<dyn AbuseStore>) -> Self {
        self.abuse_store = Some(abuse_store);
        self
    }

    /// Set the sink receiving violation records on denials.
    ///
    /// Defaults to [`TracingViolationSink`], which logs each record at WARN.
    pub fn with_violation_sink(mut self, sink: Arc<dyn ViolationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Tune the circuit breaker guarding the window store.
    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Override the per-operation store deadline.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<GatewayThrottle, BuildError> {
        if self.store_timeout.is_zero() {
            return Err(BuildError::ZeroStoreTimeout);
        }

        let metrics = Metrics::new();
        let breaker = Arc::new(CircuitBreaker::with_config(self.breaker_config));

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        // A defaulted store shares the engine clock so entry expiry agrees
        // with the window arithmetic run against it.
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::with_clock(Arc::clone(&clock))));
        let abuse_store = self
            .abuse_store
            .unwrap_or_else(|| Arc::new(InMemoryAbuseStore::new()));
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingViolationSink::new()));

        let registry = Arc::new(self.registry);

        let evaluator = AdmissionEvaluator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            sink,
            Arc::clone(&clock),
        )
        .with_metrics(metrics.clone())
        .with_circuit_breaker(Arc::clone(&breaker))
        .with_store_timeout(self.store_timeout);

        let monitor = AbuseMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            abuse_store,
            Arc::clone(&clock),
        )
        .with_metrics(metrics.clone())
        .with_store_timeout(self.store_timeout);

        let reporter = StatusReporter::new(registry, store, clock)
            .with_metrics(metrics.clone())
            .with_store_timeout(self.store_timeout);

        Ok(GatewayThrottle {
            evaluator: Arc::new(evaluator),
            monitor: Arc::new(monitor),
            reporter: Arc::new(reporter),
            metrics,
        })
    }
}

/// Admission engine for marketplace-sync API traffic.
///
/// One instance guards one deployment: every inbound request goes through
/// [`check`](GatewayThrottle::check), operators act through the block and
/// reset operations, and dashboards read [`get_status`] and the metrics
/// snapshot. Clones share all state and are cheap.
///
/// [`get_status`]: GatewayThrottle::get_status
///
/// # Example
///
/// ```
/// use gateway_throttle::{CheckRequest, GatewayThrottle};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = GatewayThrottle::new();
///
/// let request = CheckRequest::new("tenant-42", "198.51.100.7".parse().unwrap())
///     .with_marketplace("amazon");
/// let decision = engine.check(&request).await;
/// assert!(decision.is_allowed());
/// # }
/// ```
#[derive(Clone)]
pub struct GatewayThrottle {
    evaluator: Arc<AdmissionEvaluator>,
    monitor: Arc<AbuseMonitor>,
    reporter: Arc<StatusReporter>,
    metrics: Metrics,
}

impl GatewayThrottle {
    /// Create a builder for configuring the engine.
    ///
    /// Defaults:
    /// - Tier configuration: [`TierRegistry::default`]
    /// - Window store: in-memory, sharing the engine clock
    /// - Abuse ledger: in-memory
    /// - Violation sink: [`TracingViolationSink`]
    /// - Store deadline: 500 ms
    /// - Circuit breaker: opens after 5 consecutive failures, retries after 30 s
    pub fn builder() -> GatewayThrottleBuilder {
        GatewayThrottleBuilder {
            registry: TierRegistry::default(),
            store: None,
            abuse_store: None,
            sink: None,
            clock: None,
            breaker_config: CircuitBreakerConfig::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Create an engine with default settings.
    ///
    /// Equivalent to `GatewayThrottle::builder().build().unwrap()`.
    ///
    /// # Panics
    /// This method cannot panic because all default values are valid.
    pub fn new() -> Self {
        Self::builder()
            .build()
            .expect("default configuration is always valid")
    }

    /// Evaluate one request against every applicable tier.
    ///
    /// A blocked client address is denied before any tier is consulted and
    /// consumes no rate-limit state. Every call, admitted, denied or blocked,
    /// is counted by the abuse monitor on a spawned task, so this method must
    /// run inside a tokio runtime.
    pub async fn check(&self, request: &CheckRequest<'_>) -> Decision {
        let ip = request.client_ip;

        let monitor = Arc::clone(&self.monitor);
        tokio::spawn(async move { monitor.record_attempt(ip).await });

        if self.monitor.is_blocked(ip).await {
            self.metrics.record_denied();
            tracing::debug!(ip = %ip, "request denied; client address is blocked");
            return Decision::denied(
                Tier::Ip,
                self.evaluator.registry().ip.window_seconds,
                "IP address blocked",
            );
        }

        self.evaluator.check(request).await
    }

    /// Snapshot the remaining quota for `identifier` and `client_ip` without
    /// consuming any of it.
    pub async fn get_status(
        &self,
        identifier: &str,
        client_ip: IpAddr,
        marketplace: Option<&str>,
    ) -> StatusReport {
        self.reporter.get_status(identifier, client_ip, marketplace).await
    }

    /// Clear the user and user-burst windows for `identifier`, restoring its
    /// full budget immediately.
    pub async fn reset_rate_limit(&self, identifier: &str) -> Result<(), StoreError> {
        self.evaluator.reset(identifier).await
    }

    /// Block `ip` so its requests are denied before admission. Idempotent.
    pub async fn block_ip(&self, ip: IpAddr, reason: &str) -> Result<(), StoreError> {
        self.monitor.block(ip, reason).await
    }

    /// Lift an explicit block on `ip`. Idempotent.
    pub async fn unblock_ip(&self, ip: IpAddr) -> Result<(), StoreError> {
        self.monitor.unblock(ip).await
    }

    /// Whether `ip` is currently blocked.
    pub async fn is_ip_blocked(&self, ip: IpAddr) -> bool {
        self.monitor.is_blocked(ip).await
    }

    /// The suspicious-activity record for `ip`, if it has ever been flagged
    /// or blocked.
    pub async fn suspicious_record(&self, ip: IpAddr) -> Option<SuspiciousIpRecord> {
        self.monitor.suspicious_record(ip).await
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Point-in-time copy of all counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get a reference to the circuit breaker.
    ///
    /// Use this to check store health:
    /// - `circuit_breaker().state()` - Current circuit state
    /// - `circuit_breaker().consecutive_failures()` - Failure count
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        self.evaluator.circuit_breaker()
    }

    /// Get a reference to the tier configuration.
    pub fn registry(&self) -> &Arc<TierRegistry> {
        self.evaluator.registry()
    }
}

impl Default for GatewayThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GatewayThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayThrottle")
            .field("registry", self.evaluator.registry())
            .finish_non_exhaustive()
    }
}
