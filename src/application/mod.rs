//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Admission evaluator (multi-tier decision making)
//! - Abuse monitor (suspicious-activity tracking and blocking)
//! - Status reporter (read-only quota introspection)
//! - Circuit breaker and metrics (operational safety and visibility)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod abuse;
pub mod circuit_breaker;
pub mod evaluator;
pub mod locks;
pub mod metrics;
pub mod ports;
pub mod status;
