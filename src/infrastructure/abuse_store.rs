//! In-memory suspicious-IP ledger and block list.

use crate::application::ports::{AbuseStore, StoreError};
use crate::domain::SuspiciousIpRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;

/// Block list and suspicious-activity ledger backed by DashMap.
///
/// Per-address records live under one entry each, so the upsert's
/// read-modify-write runs atomically under the shard lock.
#[derive(Debug, Default)]
pub struct InMemoryAbuseStore {
    records: DashMap<IpAddr, SuspiciousIpRecord>,
}

impl InMemoryAbuseStore {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked addresses, flagged or blocked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if any address is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AbuseStore for InMemoryAbuseStore {
    async fn upsert_suspicious(&self, ip: IpAddr, count: u64, now: u64) -> Result<(), StoreError> {
        self.records
            .entry(ip)
            .and_modify(|record| {
                record.request_count += 1;
                record.last_detected_at = now;
            })
            .or_insert_with(|| SuspiciousIpRecord {
                ip,
                request_count: count,
                first_detected_at: now,
                last_detected_at: now,
                is_blocked: false,
                block_reason: None,
            });
        Ok(())
    }

    async fn get_suspicious(&self, ip: IpAddr) -> Option<SuspiciousIpRecord> {
        self.records.get(&ip).map(|record| record.clone())
    }

    async fn is_blocked(&self, ip: IpAddr) -> bool {
        self.records
            .get(&ip)
            .map(|record| record.is_blocked)
            .unwrap_or(false)
    }

    async fn block(&self, ip: IpAddr, reason: &str, now: u64) -> Result<(), StoreError> {
        self.records
            .entry(ip)
            .and_modify(|record| {
                record.is_blocked = true;
                record.block_reason = Some(reason.to_string());
            })
            .or_insert_with(|| SuspiciousIpRecord {
                ip,
                request_count: 0,
                first_detected_at: now,
                last_detected_at: now,
                is_blocked: true,
                block_reason: Some(reason.to_string()),
            });
        Ok(())
    }

    async fn unblock(&self, ip: IpAddr) -> Result<(), StoreError> {
        if let Some(mut record) = self.records.get_mut(&ip) {
            record.is_blocked = false;
            record.block_reason = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last_octet: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last_octet))
    }

    #[tokio::test]
    async fn test_first_upsert_seeds_the_count() {
        let store = InMemoryAbuseStore::new();
        store.upsert_suspicious(ip(1), 5000, 100).await.unwrap();

        let record = store.get_suspicious(ip(1)).await.unwrap();
        assert_eq!(record.request_count, 5000);
        assert_eq!(record.first_detected_at, 100);
        assert_eq!(record.last_detected_at, 100);
        assert!(!record.is_blocked);
    }

    #[tokio::test]
    async fn test_later_upserts_increment_in_place() {
        let store = InMemoryAbuseStore::new();
        store.upsert_suspicious(ip(1), 5000, 100).await.unwrap();
        store.upsert_suspicious(ip(1), 5001, 160).await.unwrap();
        store.upsert_suspicious(ip(1), 5002, 220).await.unwrap();

        let record = store.get_suspicious(ip(1)).await.unwrap();
        assert_eq!(record.request_count, 5002);
        assert_eq!(record.first_detected_at, 100);
        assert_eq!(record.last_detected_at, 220);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_address_is_not_blocked() {
        let store = InMemoryAbuseStore::new();
        assert!(!store.is_blocked(ip(9)).await);
        assert!(store.get_suspicious(ip(9)).await.is_none());
    }

    #[tokio::test]
    async fn test_block_creates_a_record_when_none_exists() {
        let store = InMemoryAbuseStore::new();
        store.block(ip(2), "credential stuffing", 500).await.unwrap();

        assert!(store.is_blocked(ip(2)).await);
        let record = store.get_suspicious(ip(2)).await.unwrap();
        assert_eq!(record.request_count, 0);
        assert_eq!(record.block_reason.as_deref(), Some("credential stuffing"));
    }

    #[tokio::test]
    async fn test_block_then_unblock_round_trips() {
        let store = InMemoryAbuseStore::new();
        store.upsert_suspicious(ip(3), 5000, 100).await.unwrap();

        store.block(ip(3), "operator action", 200).await.unwrap();
        assert!(store.is_blocked(ip(3)).await);

        store.unblock(ip(3)).await.unwrap();
        assert!(!store.is_blocked(ip(3)).await);
        // The suspicious history survives the unblock.
        let record = store.get_suspicious(ip(3)).await.unwrap();
        assert_eq!(record.request_count, 5000);
        assert!(record.block_reason.is_none());
    }

    #[tokio::test]
    async fn test_unblock_of_unknown_address_is_a_no_op() {
        let store = InMemoryAbuseStore::new();
        store.unblock(ip(4)).await.unwrap();
        assert!(store.is_empty());
    }
}
