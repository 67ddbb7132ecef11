//! Fault-injecting window store for testing.

use crate::application::ports::{Clock, StoreError, WindowStore};
use crate::domain::RateLimitKey;
use crate::infrastructure::memory_store::InMemoryStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// How the store misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Delegate to the in-memory store
    Healthy,
    /// Every operation returns `StoreError::Unavailable`
    Error,
    /// Every operation never completes, for deadline tests
    Hang,
}

/// Window store with switchable fault injection and operation counters.
///
/// Wraps an [`InMemoryStore`] so tests can run healthy traffic, flip the
/// store into an outage, and flip it back, asserting fail-open behavior and
/// circuit-breaker transitions along the way. Counters record attempted
/// operations regardless of mode.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemoryStore,
    mode: Mutex<FailureMode>,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl FlakyStore {
    /// Create a healthy store whose inner TTLs follow `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryStore::with_clock(clock),
            mode: Mutex::new(FailureMode::Healthy),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Switch the failure mode.
    pub fn set_mode(&self, mode: FailureMode) {
        *self
            .mode
            .lock()
            .expect("FlakyStore mutex poisoned - a test thread panicked while holding the lock") =
            mode;
    }

    /// Attempted `get` operations.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Attempted `set` operations.
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// Attempted `delete` operations.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    fn mode(&self) -> FailureMode {
        *self
            .mode
            .lock()
            .expect("FlakyStore mutex poisoned - a test thread panicked while holding the lock")
    }
}

#[async_trait]
impl WindowStore for FlakyStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<Vec<u64>>, StoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        match self.mode() {
            FailureMode::Healthy => self.inner.get(key).await,
            FailureMode::Error => Err(StoreError::Unavailable("injected fault".to_string())),
            FailureMode::Hang => std::future::pending().await,
        }
    }

    async fn set(
        &self,
        key: &RateLimitKey,
        window: Vec<u64>,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        match self.mode() {
            FailureMode::Healthy => self.inner.set(key, window, ttl_seconds).await,
            FailureMode::Error => Err(StoreError::Unavailable("injected fault".to_string())),
            FailureMode::Hang => std::future::pending().await,
        }
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        match self.mode() {
            FailureMode::Healthy => self.inner.delete(key).await,
            FailureMode::Error => Err(StoreError::Unavailable("injected fault".to_string())),
            FailureMode::Hang => std::future::pending().await,
        }
    }
}
