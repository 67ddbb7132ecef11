//! Outcomes of admission checks and the records they leave behind.

use crate::domain::Tier;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Result of one admission check. Ephemeral; never persisted.
///
/// Denial is an ordinary value here, not an error: callers translate
/// `Denied` into HTTP 429 plus a `Retry-After` header and move on.
///
/// # Example
/// ```
/// use gateway_throttle::{Decision, Tier};
///
/// let denied = Decision::denied(Tier::User, 60, "User burst limit exceeded");
/// assert!(denied.is_denied());
/// assert_eq!(denied.retry_after_seconds(), Some(60));
/// assert_eq!(denied.failing_tier(), Some(Tier::User));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted.
    Allowed {
        /// Quota left on the most restrictive evaluated tier, measured
        /// before this request was counted. `None` when no finite tier
        /// applied, including fail-open on a store outage.
        remaining: Option<u32>,
    },
    /// Request denied by the first tier over budget.
    Denied {
        /// Tier that produced the denial
        tier: Tier,
        /// Seconds until that tier is expected to free a slot
        retry_after_seconds: u64,
        /// Stable, tier-specific denial text
        message: String,
    },
}

impl Decision {
    /// An admitted decision carrying the pre-commit remaining quota.
    pub fn allowed(remaining: Option<u32>) -> Self {
        Decision::Allowed { remaining }
    }

    /// A denial produced by `tier`.
    pub fn denied(tier: Tier, retry_after_seconds: u64, message: impl Into<String>) -> Self {
        Decision::Denied {
            tier,
            retry_after_seconds,
            message: message.into(),
        }
    }

    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Whether the request was denied.
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied { .. })
    }

    /// Pre-commit remaining quota, for admitted decisions.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Decision::Allowed { remaining } => *remaining,
            Decision::Denied { .. } => None,
        }
    }

    /// Backoff in seconds, for denied decisions.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
        }
    }

    /// The tier that denied, if any.
    pub fn failing_tier(&self) -> Option<Tier> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { tier, .. } => Some(*tier),
        }
    }

    /// Denial text, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { message, .. } => Some(message.as_str()),
        }
    }
}

/// One denied request, as handed to the violation sink.
///
/// Append-only: written once per denial, never mutated. A sink may persist
/// or drop it; the admission path has already returned by then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Authenticated identifier the request ran under
    pub identifier: String,
    /// Tier that denied
    pub tier: Tier,
    /// Denial text as returned to the caller
    pub message: String,
    /// Backoff the caller was given
    pub retry_after_seconds: u64,
    /// Resolved client address
    pub client_ip: IpAddr,
    /// Caller's user agent, when the gate captured one
    pub user_agent: Option<String>,
    /// Free-form request classification, for audit queries
    pub request_type: String,
    /// Unix second the denial happened
    pub timestamp: u64,
}

/// Rolling record of one IP that crossed the suspicious-activity threshold.
///
/// Upserted with increment-on-conflict semantics: created on the first
/// breach, count and `last_detected_at` refreshed on later ones. Only an
/// explicit block operation flips `is_blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousIpRecord {
    /// The flagged address
    pub ip: IpAddr,
    /// Attempts observed inside the ip window at the latest breach
    pub request_count: u64,
    /// Unix second of the first breach
    pub first_detected_at: u64,
    /// Unix second of the most recent breach
    pub last_detected_at: u64,
    /// Whether an operator (or policy) has blocked the address
    pub is_blocked: bool,
    /// Reason given at block time
    pub block_reason: Option<String>,
}

/// Quota snapshot for one tier, as returned by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    /// Configured budget for the window
    pub limit: u32,
    /// `max(0, limit - current count)`
    pub remaining: u32,
    /// Worst-case Unix second by which the window is guaranteed fully
    /// clear (`now + window`). Sliding windows free slots earlier than
    /// this as individual entries expire; do not treat it as the next
    /// available slot.
    pub reset_at: u64,
}

/// Per-tier quota snapshot for one identifier, for introspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Shared global budget
    pub global: TierStatus,
    /// The identifier's own budget
    pub user: TierStatus,
    /// The client address budget
    pub ip: TierStatus,
    /// Marketplace budget, when one was asked for and is configured
    pub marketplace: Option<TierStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_allowed_accessors() {
        let decision = Decision::allowed(Some(41));
        assert!(decision.is_allowed());
        assert!(!decision.is_denied());
        assert_eq!(decision.remaining(), Some(41));
        assert_eq!(decision.retry_after_seconds(), None);
        assert_eq!(decision.failing_tier(), None);
        assert_eq!(decision.message(), None);
    }

    #[test]
    fn test_allowed_without_finite_tier() {
        let decision = Decision::allowed(None);
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining(), None);
    }

    #[test]
    fn test_denied_accessors() {
        let decision = Decision::denied(Tier::Endpoint, 17, "Endpoint rate limit exceeded for x");
        assert!(decision.is_denied());
        assert_eq!(decision.remaining(), None);
        assert_eq!(decision.retry_after_seconds(), Some(17));
        assert_eq!(decision.failing_tier(), Some(Tier::Endpoint));
        assert_eq!(
            decision.message(),
            Some("Endpoint rate limit exceeded for x")
        );
    }

    #[test]
    fn test_violation_record_round_trips_through_serde() {
        let record = ViolationRecord {
            identifier: "tenant-1".to_string(),
            tier: Tier::Ip,
            message: "IP rate limit exceeded".to_string(),
            retry_after_seconds: 30,
            client_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
            user_agent: Some("sync-agent/2.1".to_string()),
            request_type: "api_call".to_string(),
            timestamp: 1_700_000_000,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: ViolationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
