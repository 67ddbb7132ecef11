//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports; production
//! deployments may also implement them against their own cache, audit and
//! block-list services.

use crate::domain::{RateLimitKey, SuspiciousIpRecord, ViolationRecord};
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::net::IpAddr;

/// Port for obtaining current wall-clock time, in whole Unix seconds.
///
/// Windows live in a store shared across processes, so timestamps must be
/// comparable between machines; a process-local monotonic instant would not
/// survive the trip. Infrastructure provides concrete implementations
/// (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Current Unix time in seconds.
    fn now_unix(&self) -> u64;
}

/// Fault raised by a window or abuse store.
///
/// Store faults never surface as rate-limit outcomes: the evaluator absorbs
/// them by failing open and logging. They exist so adapters can say what
/// went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected or dropped the operation.
    Unavailable(String),
    /// The operation exceeded its deadline.
    Timeout,
    /// A stored value could not be encoded or decoded.
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Serialization(reason) => write!(f, "store serialization failed: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Port for the shared, TTL-capable key-value store holding one timestamp
/// window per rate-limit key.
///
/// The store owns entry expiry: a window written with a TTL must disappear
/// on its own once the TTL elapses with no rewrite. Infrastructure provides
/// concrete implementations (InMemoryStore, RedisWindowStore).
#[async_trait]
pub trait WindowStore: Send + Sync + Debug {
    /// Read the window stored under `key`, if one exists and has not expired.
    async fn get(&self, key: &RateLimitKey) -> Result<Option<Vec<u64>>, StoreError>;

    /// Write `window` under `key`, replacing any previous value and
    /// resetting the entry's TTL to `ttl_seconds`.
    async fn set(
        &self,
        key: &RateLimitKey,
        window: Vec<u64>,
        ttl_seconds: u64,
    ) -> Result<(), StoreError>;

    /// Drop the window stored under `key`, if any.
    async fn delete(&self, key: &RateLimitKey) -> Result<(), StoreError>;
}

/// Port for the append-only recorder of denied requests.
///
/// Called off the hot path, fire-and-forget: implementations own their
/// failure handling and the admission decision is already made by the time
/// a record arrives. A lost record is acceptable; a blocked caller is not.
#[async_trait]
pub trait ViolationSink: Send + Sync + Debug {
    /// Record one denial.
    async fn record(&self, violation: ViolationRecord);
}

/// Port for the suspicious-IP ledger and block list.
///
/// `upsert_suspicious` uses increment-on-conflict semantics: the first call
/// for an address creates its record, later calls bump the count and refresh
/// the last-detected time. Blocking is a separate explicit operation and is
/// idempotent, as is unblocking.
#[async_trait]
pub trait AbuseStore: Send + Sync + Debug {
    /// Create or update the suspicious record for `ip`. `count` (the attempt
    /// volume observed inside the current window) seeds a newly created
    /// record; an existing record's count is incremented by one instead.
    async fn upsert_suspicious(&self, ip: IpAddr, count: u64, now: u64)
        -> Result<(), StoreError>;

    /// Read the suspicious record for `ip`, if one exists.
    async fn get_suspicious(&self, ip: IpAddr) -> Option<SuspiciousIpRecord>;

    /// Whether `ip` is currently blocked. Cheap; called before admission.
    async fn is_blocked(&self, ip: IpAddr) -> bool;

    /// Mark `ip` blocked with `reason`, creating a record if none exists.
    async fn block(&self, ip: IpAddr, reason: &str, now: u64) -> Result<(), StoreError>;

    /// Clear the blocked flag on `ip`. A no-op for unknown addresses.
    async fn unblock(&self, ip: IpAddr) -> Result<(), StoreError>;
}
