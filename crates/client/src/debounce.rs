//! Per-key trailing-edge debouncing.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Coalesces bursts of calls per key.
///
/// Every [`Debouncer::wait`] sleeps for the quiet period; only the call that
/// was made last for its key returns `true`.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    state: Mutex<Tickets<K>>,
}

#[derive(Debug)]
struct Tickets<K> {
    next: u64,
    latest: HashMap<K, u64>,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Mutex::new(Tickets {
                next: 0,
                latest: HashMap::new(),
            }),
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the quiet period. Returns `true` if no later call for `key`
    /// arrived in the meantime and the caller should act.
    pub async fn wait(&self, key: &K) -> bool {
        let ticket = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.next += 1;
            let ticket = state.next;
            state.latest.insert(key.clone(), ticket);
            ticket
        };

        tokio::time::sleep(self.delay).await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.latest.get(key) == Some(&ticket) {
            state.latest.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop any pending call for `key`; its waiter returns `false`.
    pub fn cancel(&self, key: &K) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .remove(key);
    }
}
