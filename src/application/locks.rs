//! Per-key serialization of check-and-commit sequences.
//!
//! The evaluator reads a window, decides, then writes it back. Two tasks
//! doing that concurrently for the same key could both read a count just
//! under the limit and both be admitted. Holding a per-key lock across the
//! whole sequence removes that overshoot within one process; across
//! processes sharing a store, admissions can still overshoot by at most one
//! request per extra process per key.

use crate::domain::RateLimitKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock entries are swept once the table grows past this many keys.
const SWEEP_WATERMARK: usize = 8192;

/// Keyed mutex table granting exclusive passage per rate-limit key.
///
/// [`KeyLocks::acquire`] locks every requested key in sorted order, so two
/// callers whose key sets overlap cannot deadlock. The table is swept
/// opportunistically: entries nobody holds are dropped once the table grows
/// past a watermark, keeping it proportional to concurrent load rather than
/// to the key universe.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Lock all of `keys`, returning the guards.
    ///
    /// Keys are deduplicated and locked in their canonical sort order.
    /// Dropping the returned guards releases every lock; hold them across
    /// the full read-decide-commit sequence.
    pub async fn acquire(&self, keys: &[RateLimitKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut wanted: Vec<&RateLimitKey> = keys.iter().collect();
        wanted.sort();
        wanted.dedup();

        // Fetch (or create) the mutex handles under the table lock, then
        // await each lock with the table already released.
        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().expect("lock table poisoned");
            if table.len() > SWEEP_WATERMARK {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            wanted
                .iter()
                .map(|key| {
                    Arc::clone(
                        table
                            .entry(key.as_str().to_string())
                            .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
                    )
                })
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().expect("lock table poisoned").len()
    }
}
