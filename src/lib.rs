//! # gateway-throttle
//!
//! Multi-tier sliding-window rate limiting and abuse detection for marketplace
//! API gateways.
//!
//! This crate is the admission-control core of a gateway that fans one
//! customer's requests out to several e-commerce marketplaces. Every inbound
//! request is checked against a stack of sliding-window budgets (global, per
//! user, per client address, optionally per marketplace and per endpoint) and
//! either admitted or denied with a stable message and a retry hint suitable
//! for a `Retry-After` header.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway_throttle::{CheckRequest, Decision, GatewayThrottle};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Sensible defaults: see the tier table below
//!     let engine = GatewayThrottle::new();
//!
//!     let request = CheckRequest::new("tenant-42", "203.0.113.9".parse().unwrap())
//!         .with_marketplace("amazon")
//!         .with_endpoint("orders");
//!
//!     match engine.check(&request).await {
//!         Decision::Allowed { remaining } => {
//!             println!("admitted; tightest remaining budget: {remaining:?}");
//!         }
//!         Decision::Denied {
//!             retry_after_seconds,
//!             message,
//!             ..
//!         } => {
//!             println!("denied: {message}; retry after {retry_after_seconds}s");
//!         }
//!     }
//! }
//! ```
//!
//! ## How admission works
//!
//! Tiers are evaluated cheapest-blast-radius first: global, then the user's
//! burst sub-window, the user's main window, the client address, and finally
//! the marketplace and endpoint scopes when the request names them. The first
//! tier over budget denies the request; denials consume **no** quota anywhere,
//! so a caller hammering a denied endpoint does not burn its other budgets.
//! An admitted request is recorded in every tier that was evaluated.
//!
//! Windows slide per request rather than resetting on a boundary: each key
//! holds the Unix timestamps of its recent admissions, and a request counts
//! only the entries younger than the window. The retry hint on a denial is
//! the time until the oldest counted entry leaves the window.
//!
//! ### Default tiers
//!
//! | Tier | Budget | Window | Notes |
//! |------|-------:|-------:|-------|
//! | global | 10,000 | 1 h | one budget shared by every caller |
//! | user | 1,000 | 1 h | plus a 50-request burst cap per 60 s |
//! | ip | 2,000 | 1 h | suspicious-activity threshold at 5,000 attempts |
//! | marketplace | 250-600 | 1 h | amazon, ebay, trendyol, n11, hepsiburada, ozon |
//! | endpoint | 50-1,000 | 1-10 min | orders, products, inventory, analytics, reports, webhooks |
//!
//! Marketplace and endpoint names with no configured rule are unlimited,
//! never an error. Budgets are replaced wholesale through [`TierRegistry`]:
//!
//! ```rust,no_run
//! use gateway_throttle::{GatewayThrottle, TierRegistry, TierRule};
//!
//! let registry = TierRegistry::default()
//!     .with_user(TierRule::new(5_000, 3_600).with_burst_window(100, 60))
//!     .with_marketplace("etsy", TierRule::new(120, 3_600));
//!
//! let engine = GatewayThrottle::builder()
//!     .with_registry(registry)
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Denials and violation records
//!
//! Every denial produces a [`ViolationRecord`] carrying the identifier, tier,
//! client address, request classification and retry hint. Records are handed
//! to a [`ViolationSink`] on a spawned task, so a slow or failing sink never
//! delays the caller's response. The default sink logs at WARN through
//! `tracing`; [`ChannelViolationSink`] forwards records to an mpsc channel
//! for custom pipelines, dropping records rather than blocking when the
//! channel is full.
//!
//! ## Quota status
//!
//! [`get_status`](GatewayThrottle::get_status) reads the remaining budgets
//! without consuming any of them, for `X-RateLimit-*` response headers and
//! dashboards:
//!
//! ```rust,no_run
//! # use gateway_throttle::GatewayThrottle;
//! # #[tokio::main]
//! # async fn main() {
//! # let engine = GatewayThrottle::new();
//! let status = engine
//!     .get_status("tenant-42", "203.0.113.9".parse().unwrap(), Some("amazon"))
//!     .await;
//! println!("user quota left: {}", status.user.remaining);
//! if let Some(marketplace) = status.marketplace {
//!     println!("amazon quota left: {}", marketplace.remaining);
//! }
//! # }
//! ```
//!
//! `reset_at` in each entry is the worst-case Unix second by which the whole
//! window is clear, not the next free slot; sliding windows free capacity
//! earlier as individual entries age out.
//!
//! ## Abuse detection and blocking
//!
//! Independently of the ip budget, the engine counts **all** attempts per
//! client address, admitted and denied alike. An address crossing the
//! suspicious-activity threshold is flagged with a [`SuspiciousIpRecord`];
//! flagging never blocks by itself. Blocking is an explicit operator action,
//! and a blocked address is denied before any tier is consulted:
//!
//! ```rust,no_run
//! # use gateway_throttle::GatewayThrottle;
//! # #[tokio::main]
//! # async fn main() {
//! # let engine = GatewayThrottle::new();
//! let ip = "203.0.113.9".parse().unwrap();
//!
//! if let Some(record) = engine.suspicious_record(ip).await {
//!     println!("{} attempts since {}", record.request_count, record.first_detected_at);
//!     engine.block_ip(ip, "credential stuffing pattern").await.unwrap();
//! }
//!
//! // Later, after review:
//! engine.unblock_ip(ip).await.unwrap();
//! # }
//! ```
//!
//! ## Resolving the client address
//!
//! Deployments behind proxies should resolve the real client address from
//! forwarding headers before building a [`CheckRequest`].
//! [`resolve_client_ip`] walks the usual headers in trust order
//! (`cf-connecting-ip` first, RFC 7239 `Forwarded` last) and falls back to
//! the socket address when no candidate is publicly routable:
//!
//! ```rust,no_run
//! use gateway_throttle::resolve_client_ip;
//! use http::HeaderMap;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-forwarded-for", "93.184.216.34, 10.0.0.1".parse().unwrap());
//!
//! let ip = resolve_client_ip(&headers, "10.0.0.2".parse().unwrap());
//! assert_eq!(ip, "93.184.216.34".parse::<std::net::IpAddr>().unwrap());
//! ```
//!
//! ## Fail-Safe Operation
//!
//! The engine treats its window store as less important than the traffic it
//! guards. A store error or deadline miss makes the affected tier unlimited
//! for that call, and a circuit breaker stops consulting the store entirely
//! after repeated failures, so a store outage costs admission accuracy, never
//! availability:
//!
//! ```rust,no_run
//! # use gateway_throttle::{CircuitState, GatewayThrottle};
//! # let engine = GatewayThrottle::new();
//! match engine.circuit_breaker().state() {
//!     CircuitState::Closed => println!("store healthy"),
//!     CircuitState::Open => println!("failing open - admitting without counting"),
//!     CircuitState::HalfOpen => println!("testing recovery"),
//! }
//! ```
//!
//! Denial counts, store failures and flagged addresses are all visible
//! through [`Metrics`]:
//!
//! ```rust,no_run
//! # use gateway_throttle::GatewayThrottle;
//! # let engine = GatewayThrottle::new();
//! let snapshot = engine.metrics_snapshot();
//! println!("denial rate: {:.2}%", snapshot.denial_rate() * 100.0);
//! println!("store failures absorbed: {}", snapshot.store_failures);
//! ```
//!
//! ## Distributed deployments
//!
//! The default store is in-process. When several gateway processes must share
//! windows, enable the `redis-storage` feature and inject a
//! `RedisWindowStore`:
//!
//! ```toml
//! [dependencies]
//! gateway-throttle = { version = "0.3", features = ["redis-storage"] }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gateway_throttle::{GatewayThrottle, RedisWindowStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(
//!         RedisWindowStore::connect("redis://127.0.0.1/")
//!             .await
//!             .expect("Failed to connect"),
//!     );
//!
//!     let engine = GatewayThrottle::builder()
//!         .with_store(store)
//!         .build()
//!         .unwrap();
//! }
//! ```
//!
//! Check-and-commit is serialized per key inside one process, so a single
//! process never overshoots a budget. Across processes sharing a store the
//! overshoot per key is bounded by the process count, which is the usual
//! trade for approximate sliding windows.
//!
//! ## Testing
//!
//! The `test-helpers` feature exposes the crate's own test doubles
//! (`MockClock`, `FlakyStore`, `MockSink`) under
//! `gateway_throttle::infrastructure::mocks` so integration tests can drive
//! time and inject store faults deterministically:
//!
//! ```toml
//! [dev-dependencies]
//! gateway-throttle = { version = "*", features = ["test-helpers"] }
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    decision::{Decision, StatusReport, SuspiciousIpRecord, TierStatus, ViolationRecord},
    key::RateLimitKey,
    tier::{Tier, TierRegistry, TierRule},
};

pub use application::{
    abuse::AbuseMonitor,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    evaluator::{AdmissionEvaluator, CheckRequest},
    metrics::{Metrics, MetricsSnapshot},
    ports::{AbuseStore, Clock, StoreError, ViolationSink, WindowStore},
    status::StatusReporter,
};

pub use infrastructure::{
    abuse_store::InMemoryAbuseStore,
    client_ip::{is_publicly_routable, resolve_client_ip},
    clock::SystemClock,
    engine::{BuildError, GatewayThrottle, GatewayThrottleBuilder},
    memory_store::InMemoryStore,
    sink::{ChannelViolationSink, TracingViolationSink},
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisStoreConfig, RedisWindowStore};
