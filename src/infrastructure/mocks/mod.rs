//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod sink;
pub mod store;

pub use clock::MockClock;
pub use sink::MockSink;
pub use store::{FailureMode, FlakyStore};
