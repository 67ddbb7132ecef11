//! Storage keys addressing one sliding window each.
//!
//! A key is a deterministic string derived from a tier and its scope values,
//! so any TTL-capable key-value store can hold windows without schema. The
//! client address component is hashed before it enters a key, keeping raw
//! IPs out of shared storage and log lines built from keys.

use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

/// Key under which one timestamp window is stored.
///
/// Two requests that must share a budget always derive the same key; the
/// `Ord` impl gives the canonical order used when several keys are locked
/// for one request.
///
/// # Example
/// ```
/// use gateway_throttle::RateLimitKey;
///
/// assert_eq!(RateLimitKey::global().as_str(), "global");
/// assert_eq!(RateLimitKey::user("tenant-7").as_str(), "user:tenant-7");
/// assert_eq!(
///     RateLimitKey::marketplace("amazon", "tenant-7").as_str(),
///     "marketplace:amazon:tenant-7",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// The singleton key shared by every request.
    pub fn global() -> Self {
        RateLimitKey("global".to_string())
    }

    /// Main window for one authenticated identifier.
    pub fn user(identifier: &str) -> Self {
        RateLimitKey(format!("user:{identifier}"))
    }

    /// Burst sub-window for one authenticated identifier.
    pub fn user_burst(identifier: &str) -> Self {
        RateLimitKey(format!("user:{identifier}:burst"))
    }

    /// Window for one resolved client address.
    pub fn ip(addr: IpAddr) -> Self {
        RateLimitKey(format!("ip:{:016x}", hash_ip(addr)))
    }

    /// Window for a marketplace name, scoped to the identifier.
    pub fn marketplace(name: &str, identifier: &str) -> Self {
        RateLimitKey(format!("marketplace:{name}:{identifier}"))
    }

    /// Window for an endpoint name, scoped to the identifier.
    pub fn endpoint(name: &str, identifier: &str) -> Self {
        RateLimitKey(format!("endpoint:{name}:{identifier}"))
    }

    /// Attempt counter for suspicious-activity tracking; deliberately
    /// distinct from [`RateLimitKey::ip`] so denied attempts can be counted
    /// without touching the admission window.
    pub fn abuse(addr: IpAddr) -> Self {
        RateLimitKey(format!("abuse:{:016x}", hash_ip(addr)))
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash an address to a stable 64-bit value.
///
/// `AHasher::default()` uses fixed keys, so the same address maps to the
/// same key across processes sharing a store.
fn hash_ip(addr: IpAddr) -> u64 {
    let mut hasher = AHasher::default();
    addr.hash(&mut hasher);
    hasher.finish()
}
