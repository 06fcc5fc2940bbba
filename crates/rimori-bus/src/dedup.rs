//! Bounded FIFO of `(event_id, sender)` pairs already delivered.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Default number of remembered deliveries per listener.
pub const DEFAULT_DEDUP_CAPACITY: usize = 100;

/// Remembers the most recent deliveries so a listener never sees the same
/// `(event_id, sender)` pair twice, which breaks rebroadcast loops.
pub struct DedupWindow {
    seen: Mutex<VecDeque<(u64, String)>>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record the pair and return `true` if it had not been seen yet.
    ///
    /// When full, the oldest pair is evicted.
    pub fn insert(&self, event_id: u64, sender: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.iter().any(|(id, s)| *id == event_id && s == sender) {
            return false;
        }
        if seen.len() >= self.capacity {
            seen.pop_front();
        }
        seen.push_back((event_id, sender.to_string()));
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
