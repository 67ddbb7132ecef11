//! Suspicious-activity tracking and explicit IP blocking.
//!
//! The monitor counts every admission attempt per client address, admitted or
//! denied, in its own window key. Crossing the configured threshold flags the
//! address for operator review; nothing is ever blocked automatically.

use crate::application::locks::KeyLocks;
use crate::application::metrics::Metrics;
use crate::application::ports::{AbuseStore, Clock, StoreError, WindowStore};
use crate::domain::{window, RateLimitKey, SuspiciousIpRecord, TierRegistry};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::evaluator::DEFAULT_STORE_TIMEOUT;

/// Tracks per-address attempt volume and manages explicit blocks.
///
/// Attempt tracking is best-effort: it runs off the admission hot path, and a
/// store fault drops the sample rather than surfacing an error. Flagged
/// addresses are upserted into the abuse store with their attempt count;
/// blocking remains a separate, explicit operation.
#[derive(Debug)]
pub struct AbuseMonitor {
    registry: Arc<TierRegistry>,
    store: Arc<dyn WindowStore>,
    abuse_store: Arc<dyn AbuseStore>,
    clock: Arc<dyn Clock>,
    locks: KeyLocks,
    metrics: Metrics,
    store_timeout: Duration,
}

impl AbuseMonitor {
    /// Create a monitor with default metrics and store timeout.
    pub fn new(
        registry: Arc<TierRegistry>,
        store: Arc<dyn WindowStore>,
        abuse_store: Arc<dyn AbuseStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            store,
            abuse_store,
            clock,
            locks: KeyLocks::new(),
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

    /// Record one admission attempt for `ip`, admitted or not.
    ///
    /// Counts attempts over the ip tier's window. Reaching the registry's
    /// `suspicious_threshold` upserts a [`SuspiciousIpRecord`]; the address is
    /// flagged, not blocked. Store faults are logged and dropped.
    pub async fn record_attempt(&self, ip: IpAddr) {
        let now = self.clock.now_unix();
        let window_seconds = self.registry.ip.window_seconds;
        let retention_seconds = self.registry.ip.retention_seconds();
        let key = RateLimitKey::abuse(ip);
        let _guard = self.locks.acquire(std::slice::from_ref(&key)).await;

        let stored = match self.with_deadline(self.store.get(&key)).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(error) => {
                self.metrics.record_store_failure();
                tracing::warn!(error = %error, key = %key, "abuse tracking skipped; store unavailable");
                return;
            }
        };

        let rewritten = window::append(stored, now, retention_seconds);
        let count = window::count(&rewritten, window_seconds, now);

        if let Err(error) = self
            .with_deadline(self.store.set(&key, rewritten, retention_seconds))
            .await
        {
            self.metrics.record_store_failure();
            tracing::warn!(error = %error, key = %key, "abuse tracking skipped; store unavailable");
            return;
        }

        if count >= self.registry.suspicious_threshold {
            self.flag(ip, count, now).await;
        }
    }

    /// Whether `ip` is explicitly blocked.
    ///
    /// Consulted before any tier evaluation; a blocked address never reaches
    /// the rate-limit windows.
    pub async fn is_blocked(&self, ip: IpAddr) -> bool {
        self.abuse_store.is_blocked(ip).await
    }

    /// Explicitly block `ip`. Idempotent.
    pub async fn block(&self, ip: IpAddr, reason: &str) -> Result<(), StoreError> {
        let now = self.clock.now_unix();
        self.abuse_store.block(ip, reason, now).await?;
        tracing::info!(ip = %ip, reason, "client address blocked");
        Ok(())
    }

    /// Lift an explicit block on `ip`. Idempotent; unblocking an address
    /// that was never blocked is a no-op.
    pub async fn unblock(&self, ip: IpAddr) -> Result<(), StoreError> {
        self.abuse_store.unblock(ip).await?;
        tracing::info!(ip = %ip, "client address unblocked");
        Ok(())
    }

    /// The suspicious-activity record for `ip`, if it has ever been flagged
    /// or blocked.
    pub async fn suspicious_record(&self, ip: IpAddr) -> Option<SuspiciousIpRecord> {
        self.abuse_store.get_suspicious(ip).await
    }

    async fn flag(&self, ip: IpAddr, count: u32, now: u64) {
        let newly_flagged = self.abuse_store.get_suspicious(ip).await.is_none();
        match self
            .abuse_store
            .upsert_suspicious(ip, u64::from(count), now)
            .await
        {
            Ok(()) => {
                if newly_flagged {
                    self.metrics.record_ip_flagged();
                    tracing::info!(ip = %ip, count, "client address flagged as suspicious");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, ip = %ip, "failed to persist suspicious-activity record");
            }
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
