//! Capturing violation sink for testing.

use crate::application::ports::ViolationSink;
use crate::domain::ViolationRecord;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Sink that captures every violation record for later assertions.
///
/// Violations are dispatched fire-and-forget on a spawned task, so tests
/// should use [`wait_for_records`](Self::wait_for_records) rather than
/// asserting immediately after a denial.
#[derive(Debug, Default)]
pub struct MockSink {
    records: Mutex<Vec<ViolationRecord>>,
    arrival: Notify,
}

impl MockSink {
    /// Create an empty capturing sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured records, in arrival order.
    pub fn records(&self) -> Vec<ViolationRecord> {
        self.records
            .lock()
            .expect("MockSink mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Number of captured records.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("MockSink mutex poisoned - a test thread panicked while holding the lock")
            .len()
    }

    /// Check if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` records have arrived, or `deadline`
    /// elapses, and return whatever was captured.
    pub async fn wait_for_records(&self, count: usize, deadline: Duration) -> Vec<ViolationRecord> {
        let arrivals = async {
            while self.len() < count {
                self.arrival.notified().await;
            }
        };
        let _ = tokio::time::timeout(deadline, arrivals).await;
        self.records()
    }
}

#[async_trait]
impl ViolationSink for MockSink {
    async fn record(&self, violation: ViolationRecord) {
        self.records
            .lock()
            .expect("MockSink mutex poisoned - a test thread panicked while holding the lock")
            .push(violation);
        // notify_one stores a permit when nobody waits yet, so a record
        // landing before the waiter registers still wakes it.
        self.arrival.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn violation(identifier: &str) -> ViolationRecord {
        ViolationRecord {
            identifier: identifier.to_string(),
            tier: Tier::Global,
            message: "Global rate limit exceeded".to_string(),
            retry_after_seconds: 1,
            client_ip: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)),
            user_agent: None,
            request_type: "api_call".to_string(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_captures_in_order() {
        let sink = MockSink::new();
        sink.record(violation("a")).await;
        sink.record(violation("b")).await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "a");
        assert_eq!(records[1].identifier, "b");
    }

    #[tokio::test]
    async fn test_wait_sees_records_from_spawned_tasks() {
        let sink = Arc::new(MockSink::new());

        let writer = Arc::clone(&sink);
        tokio::spawn(async move {
            writer.record(violation("spawned")).await;
        });

        let records = sink.wait_for_records(1, Duration::from_secs(2)).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "spawned");
    }

    #[tokio::test]
    async fn test_wait_returns_partial_capture_on_deadline() {
        let sink = MockSink::new();
        sink.record(violation("only")).await;

        let records = sink.wait_for_records(5, Duration::from_millis(20)).await;
        assert_eq!(records.len(), 1);
    }
}
