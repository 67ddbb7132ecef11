//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Window and abuse-ledger stores (in-memory, optionally Redis)
//! - Violation sinks (tracing, channel)
//! - Client address resolution from proxy headers
//! - The engine façade tying the pipeline together

pub mod abuse_store;
pub mod client_ip;
pub mod clock;
pub mod engine;
pub mod memory_store;
pub mod sink;

#[cfg(feature = "redis-storage")]
pub mod redis_store;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for testing
/// admission behavior.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// gateway-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
