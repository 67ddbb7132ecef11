//! In-memory window store for single-process deployments.
//!
//! Backs the engine with a concurrent map when no shared cache is available.
//! Not suitable for multi-process deployments: every process would count
//! against its own private windows.

use crate::application::ports::{Clock, StoreError, WindowStore};
use crate::domain::RateLimitKey;
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredWindow {
    expires_at: u64,
    timestamps: Vec<u64>,
}

/// Thread-safe window store backed by DashMap.
///
/// DashMap provides lock-free reads and fine-grained locking for writes,
/// making it ideal for high-throughput admission checks.
///
/// TTLs are enforced lazily: an entry whose TTL has lapsed reads as absent
/// and is reaped on that read or on the next overwrite. There is no
/// background sweeper; call [`purge_expired`](Self::purge_expired) if
/// long-idle keys need reclaiming eagerly.
#[derive(Debug)]
pub struct InMemoryStore {
    map: DashMap<RateLimitKey, StoredWindow>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Create a store reading TTLs from the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
        }
    }

    /// Number of stored windows, including lapsed entries not yet reaped.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every entry whose TTL has lapsed.
    pub fn purge_expired(&self) {
        let now = self.clock.now_unix();
        self.map.retain(|_, stored| stored.expires_at > now);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for InMemoryStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<Vec<u64>>, StoreError> {
        let now = self.clock.now_unix();
        let lapsed = match self.map.get(key) {
            Some(stored) => {
                if stored.expires_at > now {
                    return Ok(Some(stored.timestamps.clone()));
                }
                true
            }
            None => false,
        };

        if lapsed {
            // Re-checked under the shard lock; a concurrent fresh write wins.
            self.map.remove_if(key, |_, stored| stored.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &RateLimitKey,
        window: Vec<u64>,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_unix();
        self.map.insert(
            key.clone(),
            StoredWindow {
                expires_at: now.saturating_add(ttl_seconds),
                timestamps: window,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn key(raw: &str) -> RateLimitKey {
        RateLimitKey::user(raw)
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let store = InMemoryStore::with_clock(Arc::new(MockClock::new(1000)));

        store.set(&key("u1"), vec![990, 995, 1000], 60).await.unwrap();
        let window = store.get(&key("u1")).await.unwrap();
        assert_eq!(window, Some(vec![990, 995, 1000]));
    }

    #[tokio::test]
    async fn test_missing_key_reads_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(&key("absent")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lapsed_entry_reads_none_and_is_reaped() {
        let clock = Arc::new(MockClock::new(1000));
        let store = InMemoryStore::with_clock(clock.clone());

        store.set(&key("u1"), vec![1000], 10).await.unwrap();
        clock.advance(11);

        assert_eq!(store.get(&key("u1")).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_window_and_ttl() {
        let clock = Arc::new(MockClock::new(1000));
        let store = InMemoryStore::with_clock(clock.clone());

        store.set(&key("u1"), vec![1000], 10).await.unwrap();
        clock.advance(5);
        store.set(&key("u1"), vec![1000, 1005], 10).await.unwrap();

        // The rewrite extended the deadline past the original one.
        clock.advance(7);
        let window = store.get(&key("u1")).await.unwrap();
        assert_eq!(window, Some(vec![1000, 1005]));
    }

    #[tokio::test]
    async fn test_delete_removes_the_key() {
        let store = InMemoryStore::with_clock(Arc::new(MockClock::new(1000)));

        store.set(&key("u1"), vec![1000], 60).await.unwrap();
        store.delete(&key("u1")).await.unwrap();
        assert_eq!(store.get(&key("u1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.delete(&key("never_written")).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired_drops_only_lapsed_entries() {
        let clock = Arc::new(MockClock::new(1000));
        let store = InMemoryStore::with_clock(clock.clone());

        store.set(&key("short"), vec![1000], 10).await.unwrap();
        store.set(&key("long"), vec![1000], 100).await.unwrap();

        clock.advance(50);
        store.purge_expired();

        assert_eq!(store.len(), 1);
        assert!(store.get(&key("long")).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_land_every_key() {
        let store = Arc::new(InMemoryStore::new());
        let mut tasks = Vec::new();

        for i in 0..10 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                for j in 0..100 {
                    let key = RateLimitKey::user(&format!("writer_{i}_{j}"));
                    store.set(&key, vec![j], 60).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len(), 1000);
    }
}
