//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of the admission
//! engine:
//! - Tier rules and the immutable registry
//! - Storage key derivation
//! - Sliding-window counting primitives
//! - Decisions and the records denials leave behind
//!
//! All types in this layer are pure and easily testable; nothing here does
//! I/O or knows about time sources.

pub mod decision;
pub mod key;
pub mod tier;
pub mod window;

pub use decision::{Decision, StatusReport, SuspiciousIpRecord, TierStatus, ViolationRecord};
pub use key::RateLimitKey;
pub use tier::{Tier, TierRegistry, TierRule};
