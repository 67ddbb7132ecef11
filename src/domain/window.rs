//! Sliding-window counting over stored timestamp sets.
//!
//! A window is the stored value for one rate-limit key: one Unix timestamp
//! per admitted request, unordered. Counting filters to the trailing
//! interval, so limits slide with time instead of resetting on calendar
//! boundaries. Memory and prune cost grow with in-window volume; that is the
//! price of exact sliding semantics over bucketed approximations.
//!
//! All functions here are pure; reading and rewriting windows is the
//! caller's job.

/// Stored timestamp set for one rate-limit key.
pub type Window = Vec<u64>;

/// Count the entries still inside the trailing window.
///
/// An entry counts while it is strictly newer than `now - window_seconds`;
/// an entry exactly `window_seconds` old no longer counts.
pub fn count(window: &[u64], window_seconds: u64, now: u64) -> u32 {
    let start = now.saturating_sub(window_seconds);
    let inside = window.iter().filter(|&&ts| ts > start).count();
    u32::try_from(inside).unwrap_or(u32::MAX)
}

/// Seconds until the oldest stored entry leaves the window.
///
/// Ties the caller's backoff to real capacity: the window frees a slot when
/// its oldest entry expires, not at a fixed interval. An empty window yields
/// the minimum backoff of 1 second, as does a window whose oldest entry has
/// already expired.
pub fn retry_after(window: &[u64], window_seconds: u64, now: u64) -> u64 {
    match window.iter().min() {
        None => 1,
        Some(&oldest) => (oldest + window_seconds).saturating_sub(now).max(1),
    }
}

/// Record one admitted request and prune entries past retention.
///
/// Pushes `now`, then drops everything at or beyond `retention_seconds` old.
/// Retention runs twice the window by convention (see
/// [`TierRule::retention_seconds`](crate::TierRule::retention_seconds)), so
/// countable entries survive clock and window skew. The result is what gets
/// written back to the store, with a TTL equal to the retention.
pub fn append(mut window: Window, now: u64, retention_seconds: u64) -> Window {
    window.push(now);
    let horizon = now.saturating_sub(retention_seconds);
    window.retain(|&ts| ts > horizon);
    window
}
