//! Processed-webhook-event cache.
//!
//! Processors deliver events at least once. Order and withdrawal status
//! guards already make reapplication a no-op; this cache short-circuits
//! redeliveries before any store work. An id is recorded only after its
//! event was applied successfully, so a failed application is retried on
//! redelivery.
//!
//! The cache is bounded with FIFO eviction so memory stays predictable in
//! long-running processes.

use std::collections::{HashSet, VecDeque};

/// Bounded set of processed event ids.
#[derive(Debug)]
pub struct ProcessedEvents {
    seen: HashSet<String>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<String>,
    max_size: usize,
}

impl ProcessedEvents {
    /// A zero `max_size` is treated as 1.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    #[must_use]
    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    /// Record `event_id`. Returns `false` if it was already recorded.
    pub fn mark_processed(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(event_id.to_string());
        self.order.push_back(event_id.to_string());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
