//! Multi-tier admission evaluation.
//!
//! The evaluator decides whether one request is admitted against every tier
//! that applies to it, commits increments only when all tiers pass, and
//! reports denials to the violation sink without blocking the caller.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::locks::KeyLocks;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, StoreError, ViolationSink, WindowStore};
use crate::domain::{window, Decision, RateLimitKey, Tier, TierRegistry, TierRule, ViolationRecord};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Deadline applied to every window-store round-trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// One inbound request presented for admission.
///
/// Borrowed from the caller's request context; nothing here is stored
/// beyond the check except inside a [`ViolationRecord`] on denial.
#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    /// Authenticated user or API-key scope
    pub identifier: &'a str,
    /// Free-form classification, used for violation records only
    pub request_type: &'a str,
    /// Marketplace name, when the request targets one
    pub marketplace: Option<&'a str>,
    /// Endpoint name, when the request targets one
    pub endpoint: Option<&'a str>,
    /// Resolved client address
    pub client_ip: IpAddr,
    /// Caller's user agent, carried into violation records
    pub user_agent: Option<&'a str>,
}

impl<'a> CheckRequest<'a> {
    /// A request with no marketplace or endpoint scope and the default
    /// `"api_call"` classification.
    pub fn new(identifier: &'a str, client_ip: IpAddr) -> Self {
        Self {
            identifier,
            request_type: "api_call",
            marketplace: None,
            endpoint: None,
            client_ip,
            user_agent: None,
        }
    }

    /// Set the request classification.
    pub fn with_request_type(mut self, request_type: &'a str) -> Self {
        self.request_type = request_type;
        self
    }

    /// Scope the request to a marketplace.
    pub fn with_marketplace(mut self, marketplace: &'a str) -> Self {
        self.marketplace = Some(marketplace);
        self
    }

    /// Scope the request to an endpoint.
    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Attach the caller's user agent.
    pub fn with_user_agent(mut self, user_agent: &'a str) -> Self {
        self.user_agent = Some(user_agent);
        self
    }
}

/// One tier evaluation assembled for a single request.
#[derive(Debug)]
struct TierCheck<'a> {
    tier: Tier,
    key: RateLimitKey,
    limit: u32,
    window_seconds: u64,
    retention_seconds: u64,
    /// Burst sub-window check; denials back off for the whole burst window
    is_burst: bool,
    /// Marketplace or endpoint name, for the denial message
    scope: Option<&'a str>,
}

impl<'a> TierCheck<'a> {
    fn main(tier: Tier, key: RateLimitKey, rule: &TierRule, scope: Option<&'a str>) -> Self {
        Self {
            tier,
            key,
            limit: rule.max_requests,
            window_seconds: rule.window_seconds,
            retention_seconds: rule.retention_seconds(),
            is_burst: false,
            scope,
        }
    }

    fn burst(key: RateLimitKey, burst_limit: u32, burst_window_seconds: u64) -> Self {
        Self {
            tier: Tier::User,
            key,
            limit: burst_limit,
            window_seconds: burst_window_seconds,
            retention_seconds: burst_window_seconds.saturating_mul(2),
            is_burst: true,
            scope: None,
        }
    }

    fn denial_message(&self) -> String {
        match (self.tier, self.is_burst) {
            (Tier::Global, _) => "Global rate limit exceeded".to_string(),
            (Tier::User, true) => "User burst limit exceeded".to_string(),
            (Tier::User, false) => "User rate limit exceeded".to_string(),
            (Tier::Ip, _) => "IP rate limit exceeded".to_string(),
            (Tier::Marketplace, _) => format!(
                "Marketplace rate limit exceeded for {}",
                self.scope.unwrap_or_default()
            ),
            (Tier::Endpoint, _) => format!(
                "Endpoint rate limit exceeded for {}",
                self.scope.unwrap_or_default()
            ),
        }
    }
}

/// Coordinates multi-tier admission decisions.
///
/// Tiers are evaluated broadest first (`global`, user burst, `user`, `ip`,
/// `marketplace`, `endpoint`); the first tier over budget short-circuits the
/// rest and produces the denial. Only a fully admitted request commits
/// increments, and it commits them to every applicable tier key.
///
/// Check-and-commit runs under per-key locks ([`KeyLocks`]), so concurrent
/// requests against the same keys cannot overshoot within this process.
#[derive(Debug)]
pub struct AdmissionEvaluator {
    registry: Arc<TierRegistry>,
    store: Arc<dyn WindowStore>,
    sink: Arc<dyn ViolationSink>,
    clock: Arc<dyn Clock>,
    locks: KeyLocks,
    metrics: Metrics,
    breaker: Arc<CircuitBreaker>,
    store_timeout: Duration,
}

impl AdmissionEvaluator {
    /// Create an evaluator with default metrics, circuit breaker and store
    /// timeout.
    ///
    /// # Arguments
    /// * `registry` - Immutable tier configuration
    /// * `store` - Shared window store
    /// * `sink` - Recorder for denied requests
    /// * `clock` - Wall-clock source
    pub fn new(
        registry: Arc<TierRegistry>,
        store: Arc<dyn WindowStore>,
        sink: Arc<dyn ViolationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            sink,
            clock,
            locks: KeyLocks::new(),
            metrics: Metrics::new(),
            breaker: Arc::new(CircuitBreaker::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Use a shared metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use a shared circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Override the per-operation store deadline.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Evaluate one request against every applicable tier.
    ///
    /// # Returns
    /// `Decision::Allowed` with the pre-commit remaining quota of the most
    /// restrictive evaluated tier, or `Decision::Denied` from the first tier
    /// over budget. Denials commit no increments anywhere and dispatch a
    /// [`ViolationRecord`] to the sink without awaiting it.
    ///
    /// # Fail-Safe Behavior
    /// A store fault or deadline miss on any tier makes that tier unlimited
    /// for this call: the fault is logged and counted, never returned. While
    /// the circuit breaker is open the store is not consulted at all and the
    /// request is admitted immediately.
    pub async fn check(&self, request: &CheckRequest<'_>) -> Decision {
        if !self.breaker.allow_attempt() {
            tracing::debug!(
                identifier = request.identifier,
                "circuit open; admitting without store round-trip"
            );
            self.metrics.record_allowed();
            return Decision::allowed(None);
        }

        let now = self.clock.now_unix();
        let checks = self.assemble_checks(request);
        let keys: Vec<RateLimitKey> = checks.iter().map(|check| check.key.clone()).collect();
        let _guards = self.locks.acquire(&keys).await;

        // Read every applicable window once, evaluating in tier order.
        // `None` marks a tier whose read failed open.
        let mut windows: Vec<Option<Vec<u64>>> = Vec::with_capacity(checks.len());
        let mut min_remaining: Option<u32> = None;

        for check in &checks {
            let loaded = match self.load_window(&check.key).await {
                Some(stored) => stored,
                None => {
                    windows.push(None);
                    continue;
                }
            };

            let count = window::count(&loaded, check.window_seconds, now);
            if count >= check.limit {
                let retry_after = if check.is_burst {
                    check.window_seconds
                } else {
                    window::retry_after(&loaded, check.window_seconds, now)
                };
                let message = check.denial_message();
                tracing::debug!(
                    identifier = request.identifier,
                    tier = %check.tier,
                    count,
                    limit = check.limit,
                    retry_after,
                    "request denied"
                );
                self.metrics.record_denied();
                self.dispatch_violation(request, check.tier, &message, retry_after, now);
                return Decision::denied(check.tier, retry_after, message);
            }

            let remaining = check.limit - count;
            min_remaining = Some(min_remaining.map_or(remaining, |m| m.min(remaining)));
            windows.push(Some(loaded));
        }

        // Every tier passed: commit one increment per applicable key.
        // Tiers whose read failed open are left untouched rather than
        // overwritten with a fresh window.
        for (check, loaded) in checks.iter().zip(windows) {
            if let Some(loaded) = loaded {
                let rewritten = window::append(loaded, now, check.retention_seconds);
                self.store_window(&check.key, rewritten, check.retention_seconds)
                    .await;
            }
        }

        self.metrics.record_allowed();
        Decision::allowed(min_remaining)
    }

    /// Hard-reset the user and user-burst windows for `identifier`.
    ///
    /// Administrative operation, not on the hot path: store faults are
    /// returned to the caller instead of being absorbed.
    pub async fn reset(&self, identifier: &str) -> Result<(), StoreError> {
        let user = RateLimitKey::user(identifier);
        let burst = RateLimitKey::user_burst(identifier);
        let _guards = self.locks.acquire(&[user.clone(), burst.clone()]).await;

        self.with_deadline(self.store.delete(&user)).await?;
        self.with_deadline(self.store.delete(&burst)).await?;
        tracing::info!(identifier, "rate limit reset");
        Ok(())
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get a reference to the circuit breaker.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Get a reference to the tier configuration.
    pub fn registry(&self) -> &Arc<TierRegistry> {
        &self.registry
    }

    fn assemble_checks<'a>(&self, request: &CheckRequest<'a>) -> Vec<TierCheck<'a>> {
        let mut checks = Vec::with_capacity(6);

        checks.push(TierCheck::main(
            Tier::Global,
            RateLimitKey::global(),
            &self.registry.global,
            None,
        ));

        // Burst runs before the user main window and fails fast.
        if let Some((burst_limit, burst_window)) = self.registry.user.burst() {
            checks.push(TierCheck::burst(
                RateLimitKey::user_burst(request.identifier),
                burst_limit,
                burst_window,
            ));
        }
        checks.push(TierCheck::main(
            Tier::User,
            RateLimitKey::user(request.identifier),
            &self.registry.user,
            None,
        ));
        checks.push(TierCheck::main(
            Tier::Ip,
            RateLimitKey::ip(request.client_ip),
            &self.registry.ip,
            None,
        ));

        // Unconfigured marketplace and endpoint names are unlimited.
        if let Some(name) = request.marketplace {
            if let Some(rule) = self.registry.marketplace(name) {
                checks.push(TierCheck::main(
                    Tier::Marketplace,
                    RateLimitKey::marketplace(name, request.identifier),
                    rule,
                    Some(name),
                ));
            }
        }
        if let Some(name) = request.endpoint {
            if let Some(rule) = self.registry.endpoint(name) {
                checks.push(TierCheck::main(
                    Tier::Endpoint,
                    RateLimitKey::endpoint(name, request.identifier),
                    rule,
                    Some(name),
                ));
            }
        }

        checks
    }

    async fn load_window(&self, key: &RateLimitKey) -> Option<Vec<u64>> {
        match self.with_deadline(self.store.get(key)).await {
            Ok(stored) => {
                self.breaker.record_success();
                Some(stored.unwrap_or_default())
            }
            Err(error) => {
                self.absorb_store_failure(key, &error);
                None
            }
        }
    }

    async fn store_window(&self, key: &RateLimitKey, rewritten: Vec<u64>, ttl_seconds: u64) {
        match self
            .with_deadline(self.store.set(key, rewritten, ttl_seconds))
            .await
        {
            Ok(()) => self.breaker.record_success(),
            Err(error) => self.absorb_store_failure(key, &error),
        }
    }

    async fn with_deadline<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    fn absorb_store_failure(&self, key: &RateLimitKey, error: &StoreError) {
        self.breaker.record_failure();
        self.metrics.record_store_failure();
        tracing::warn!(error = %error, key = %key, "window store unavailable; failing open");
    }

    fn dispatch_violation(
        &self,
        request: &CheckRequest<'_>,
        tier: Tier,
        message: &str,
        retry_after_seconds: u64,
        now: u64,
    ) {
        let record = ViolationRecord {
            identifier: request.identifier.to_string(),
            tier,
            message: message.to_string(),
            retry_after_seconds,
            client_ip: request.client_ip,
            user_agent: request.user_agent.map(str::to_string),
            request_type: request.request_type.to_string(),
            timestamp: now,
        };
        self.metrics.record_violation_dispatched();

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.record(record).await;
        });
    }
}
