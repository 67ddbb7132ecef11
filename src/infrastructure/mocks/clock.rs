//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling
/// deterministic testing of sliding-window behavior: requests can be placed
/// at exact Unix seconds and the window slid forward on demand.
///
/// # Examples
///
/// ```
/// use gateway_throttle::infrastructure::mocks::MockClock;
/// use gateway_throttle::application::ports::Clock;
///
/// let clock = MockClock::new(1_000_000);
/// assert_eq!(clock.now_unix(), 1_000_000);
///
/// // Advance time explicitly
/// clock.advance(60);
/// assert_eq!(clock.now_unix(), 1_000_060);
///
/// // Or jump to a specific second
/// clock.set(2_000_000);
/// assert_eq!(clock.now_unix(), 2_000_000);
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across tasks.
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    now_unix: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at a specific Unix second.
    pub fn new(start_unix: u64) -> Self {
        Self {
            now_unix: Arc::new(AtomicU64::new(start_unix)),
        }
    }

    /// Advance the clock by whole seconds.
    pub fn advance(&self, seconds: u64) {
        self.now_unix.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Set the clock to a specific Unix second.
    pub fn set(&self, now_unix: u64) {
        self.now_unix.store(now_unix, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_unix(&self) -> u64 {
        self.now_unix.load(Ordering::SeqCst)
    }
}
