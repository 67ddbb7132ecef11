//! Read-only quota introspection.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, StoreError, WindowStore};
use crate::domain::{window, RateLimitKey, StatusReport, TierRegistry, TierRule, TierStatus};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::evaluator::DEFAULT_STORE_TIMEOUT;

/// Answers "how much quota is left" without consuming any.
///
/// Reports cover the global, user and ip tiers, plus the marketplace tier
/// when a configured marketplace name is given. Reads never commit anything,
/// and a store fault degrades to reporting the full budget rather than an
/// error, mirroring the evaluator's fail-open admission.
///
/// `reset_at` in each [`TierStatus`] is `now + window_seconds`: the worst-case
/// point at which the sliding window is guaranteed fully clear. Individual
/// slots free up earlier as old entries age out, so callers must not treat it
/// as the time of the next available slot.
#[derive(Debug)]
pub struct StatusReporter {
    registry: Arc<TierRegistry>,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    store_timeout: Duration,
}

impl StatusReporter {
    /// Create a reporter with default metrics and store timeout.
    pub fn new(
        registry: Arc<TierRegistry>,
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            metrics: Metrics::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Use a shared metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Override the per-operation store deadline.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Snapshot the remaining quota for `identifier` and `client_ip`.
    ///
    /// An unconfigured `marketplace` name yields no marketplace sub-report,
    /// consistent with unconfigured names being unlimited at admission.
    pub async fn get_status(
        &self,
        identifier: &str,
        client_ip: IpAddr,
        marketplace: Option<&str>,
    ) -> StatusReport {
        let now = self.clock.now_unix();

        let global = self
            .tier_status(&RateLimitKey::global(), &self.registry.global, now)
            .await;
        let user = self
            .tier_status(&RateLimitKey::user(identifier), &self.registry.user, now)
            .await;
        let ip = self
            .tier_status(&RateLimitKey::ip(client_ip), &self.registry.ip, now)
            .await;

        let marketplace = match marketplace {
            Some(name) => match self.registry.marketplace(name) {
                Some(rule) => Some(
                    self.tier_status(&RateLimitKey::marketplace(name, identifier), rule, now)
                        .await,
                ),
                None => None,
            },
            None => None,
        };

        StatusReport {
            global,
            user,
            ip,
            marketplace,
        }
    }

    async fn tier_status(&self, key: &RateLimitKey, rule: &TierRule, now: u64) -> TierStatus {
        let count = match self.with_deadline(self.store.get(key)).await {
            Ok(stored) => window::count(&stored.unwrap_or_default(), rule.window_seconds, now),
            Err(error) => {
                self.metrics.record_store_failure();
                tracing::warn!(error = %error, key = %key, "status read failed; reporting full budget");
                0
            }
        };

        TierStatus {
            limit: rule.max_requests,
            remaining: rule.max_requests.saturating_sub(count),
            reset_at: now.saturating_add(rule.window_seconds),
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
}
