//! Violation sink adapters.
//!
//! Sinks receive denial records fire-and-forget: the admission path has
//! already answered the caller, so delivery is best-effort by contract.

use crate::application::ports::ViolationSink;
use crate::domain::ViolationRecord;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Sink that emits each violation as a structured warning event.
///
/// The default sink: violations land in whatever tracing subscriber the host
/// application has installed, which is enough for alerting on abusive
/// callers without any persistence wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingViolationSink;

impl TracingViolationSink {
    /// Create a tracing-backed sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ViolationSink for TracingViolationSink {
    async fn record(&self, violation: ViolationRecord) {
        tracing::warn!(
            identifier = %violation.identifier,
            tier = %violation.tier,
            client_ip = %violation.client_ip,
            request_type = %violation.request_type,
            retry_after_seconds = violation.retry_after_seconds,
            message = %violation.message,
            "rate limit violation"
        );
    }
}

/// Sink that forwards violations over a bounded channel.
///
/// For hosts that persist violations (audit tables, SIEM shippers): the
/// consumer drains the receiver at its own pace. When the channel is full or
/// the consumer is gone the record is dropped, never queued unboundedly and
/// never blocking the admission path.
#[derive(Debug)]
pub struct ChannelViolationSink {
    tx: mpsc::Sender<ViolationRecord>,
}

impl ChannelViolationSink {
    /// Create a sink and the receiver to drain it with.
    ///
    /// # Arguments
    /// * `capacity` - Maximum records buffered before new ones are dropped
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ViolationRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ViolationSink for ChannelViolationSink {
    async fn record(&self, violation: ViolationRecord) {
        if let Err(error) = self.tx.try_send(violation) {
            tracing::debug!(error = %error, "violation record dropped; channel full or closed");
        }
    }
}
