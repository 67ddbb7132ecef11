//! Tier rules and the immutable registry that holds them.
//!
//! A tier is one independently enforced rate-limit scope. Every inbound
//! request is checked against all tiers that apply to it, each with its own
//! request budget and window length.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The five independently enforced rate-limit scopes.
///
/// Tiers are always evaluated broadest first: `Global`, then `User` (burst
/// sub-window before the main window), then `Ip`, `Marketplace`, `Endpoint`.
/// The first tier over budget decides the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// One shared budget across every caller
    Global,
    /// Per authenticated identifier
    User,
    /// Per resolved client address
    Ip,
    /// Per marketplace name, scoped to the identifier
    Marketplace,
    /// Per endpoint name, scoped to the identifier
    Endpoint,
}

impl Tier {
    /// Stable lowercase name, used in storage keys, logs and denial payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::User => "user",
            Tier::Ip => "ip",
            Tier::Marketplace => "marketplace",
            Tier::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request budget for one tier scope.
///
/// A rule always carries a main window (`max_requests` per `window_seconds`).
/// A burst sub-window is enforced only when *both* `burst_limit` and
/// `burst_window_seconds` are set; a bare `burst_limit` is kept as
/// configuration but has no effect, matching the shipped defaults where only
/// the user tier carries a burst window.
///
/// # Example
/// ```
/// use gateway_throttle::TierRule;
///
/// let user = TierRule::new(1000, 3600).with_burst_window(50, 60);
/// assert_eq!(user.burst(), Some((50, 60)));
///
/// let amazon = TierRule::new(500, 3600).with_burst(25);
/// assert_eq!(amazon.burst(), None); // no burst window configured
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    /// Requests admitted per main window
    pub max_requests: u32,
    /// Main window length in seconds
    pub window_seconds: u64,
    /// Requests admitted per burst window, if burst is enforced
    #[serde(default)]
    pub burst_limit: Option<u32>,
    /// Burst window length in seconds
    #[serde(default)]
    pub burst_window_seconds: Option<u64>,
}

impl TierRule {
    /// Create a rule with a main window and no burst enforcement.
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
            burst_limit: None,
            burst_window_seconds: None,
        }
    }

    /// Attach a burst budget without its own window (configuration-inert).
    pub fn with_burst(mut self, burst_limit: u32) -> Self {
        self.burst_limit = Some(burst_limit);
        self
    }

    /// Attach an enforced burst sub-window.
    pub fn with_burst_window(mut self, burst_limit: u32, burst_window_seconds: u64) -> Self {
        self.burst_limit = Some(burst_limit);
        self.burst_window_seconds = Some(burst_window_seconds);
        self
    }

    /// The enforced burst budget, when both halves are configured.
    pub fn burst(&self) -> Option<(u32, u64)> {
        match (self.burst_limit, self.burst_window_seconds) {
            (Some(limit), Some(window)) => Some((limit, window)),
            _ => None,
        }
    }

    /// How long stored timestamps are kept: twice the window, so a reread
    /// after clock or window skew still sees every countable entry.
    pub fn retention_seconds(&self) -> u64 {
        self.window_seconds.saturating_mul(2)
    }
}

/// Immutable rate-limit configuration for the whole engine.
///
/// Built once at startup (from `Default`, a deserialized config file, or the
/// `with_*` setters) and injected by shared reference; nothing mutates a
/// registry after that. Marketplace and endpoint names absent from the maps
/// are unlimited, never an error.
///
/// # Example
/// ```
/// use gateway_throttle::{TierRegistry, TierRule};
///
/// let registry = TierRegistry::default()
///     .with_marketplace("etsy", TierRule::new(150, 3600));
/// assert!(registry.marketplace("etsy").is_some());
/// assert!(registry.marketplace("walmart").is_none()); // unlimited
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierRegistry {
    /// Shared budget across all callers
    pub global: TierRule,
    /// Per-identifier budget, including the burst sub-window
    pub user: TierRule,
    /// Per-client-address budget
    pub ip: TierRule,
    /// Attempts per IP within the ip window that flag the address as
    /// suspicious; independent of the ip budget itself
    pub suspicious_threshold: u32,
    /// Per-marketplace budgets; absent names are unlimited
    pub marketplaces: HashMap<String, TierRule>,
    /// Per-endpoint budgets; absent names are unlimited
    pub endpoints: HashMap<String, TierRule>,
}

impl TierRegistry {
    /// Look up the rule for a marketplace name, if one is configured.
    pub fn marketplace(&self, name: &str) -> Option<&TierRule> {
        self.marketplaces.get(name)
    }

    /// Look up the rule for an endpoint name, if one is configured.
    pub fn endpoint(&self, name: &str) -> Option<&TierRule> {
        self.endpoints.get(name)
    }

    /// Add or replace a marketplace rule (pre-injection configuration only).
    pub fn with_marketplace(mut self, name: impl Into<String>, rule: TierRule) -> Self {
        self.marketplaces.insert(name.into(), rule);
        self
    }

    /// Add or replace an endpoint rule (pre-injection configuration only).
    pub fn with_endpoint(mut self, name: impl Into<String>, rule: TierRule) -> Self {
        self.endpoints.insert(name.into(), rule);
        self
    }

    /// Replace the global rule.
    pub fn with_global(mut self, rule: TierRule) -> Self {
        self.global = rule;
        self
    }

    /// Replace the user rule.
    pub fn with_user(mut self, rule: TierRule) -> Self {
        self.user = rule;
        self
    }

    /// Replace the ip rule.
    pub fn with_ip(mut self, rule: TierRule) -> Self {
        self.ip = rule;
        self
    }

    /// Replace the suspicious-activity threshold.
    pub fn with_suspicious_threshold(mut self, threshold: u32) -> Self {
        self.suspicious_threshold = threshold;
        self
    }
}

impl Default for TierRegistry {
    /// The shipped production defaults.
    ///
    /// Note the deliberate inconsistency carried over from production: the
    /// suspicious threshold (5000) sits above the ip budget (2000) for the
    /// same window, so it is only reachable when denied attempts count too.
    fn default() -> Self {
        let marketplaces = [
            ("amazon", TierRule::new(500, 3600).with_burst(25)),
            ("ebay", TierRule::new(400, 3600).with_burst(20)),
            ("trendyol", TierRule::new(600, 3600).with_burst(30)),
            ("n11", TierRule::new(300, 3600).with_burst(15)),
            ("hepsiburada", TierRule::new(400, 3600).with_burst(20)),
            ("ozon", TierRule::new(250, 3600).with_burst(12)),
        ]
        .into_iter()
        .map(|(name, rule)| (name.to_string(), rule))
        .collect();

        let endpoints = [
            ("orders", TierRule::new(200, 300).with_burst(10)),
            ("products", TierRule::new(500, 600).with_burst(25)),
            ("inventory", TierRule::new(300, 300).with_burst(15)),
            ("analytics", TierRule::new(100, 600).with_burst(5)),
            ("reports", TierRule::new(50, 300).with_burst(3)),
            ("webhooks", TierRule::new(1000, 60).with_burst(50)),
        ]
        .into_iter()
        .map(|(name, rule)| (name.to_string(), rule))
        .collect();

        Self {
            global: TierRule::new(10_000, 3600).with_burst(100),
            user: TierRule::new(1000, 3600).with_burst_window(50, 60),
            ip: TierRule::new(2000, 3600).with_burst(100),
            suspicious_threshold: 5000,
            marketplaces,
            endpoints,
        }
    }
}
