//! Cancellable deadline queue.
//!
//! One queue holds every pending cleanup deadline, so a single sleeper can wait
//! for the earliest one and `stop` can cancel them all at once instead of
//! chasing independent timers.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Instant;

/// Deadlines keyed by `K`; at most one deadline per key.
#[derive(Debug)]
pub struct DeadlineQueue<K> {
    by_deadline: BTreeMap<(Instant, u64), K>,
    index: HashMap<K, (Instant, u64)>,
    seq: u64,
}

impl<K: Clone + Eq + Hash> Default for DeadlineQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> DeadlineQueue<K> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            by_deadline: BTreeMap::new(),
            index: HashMap::new(),
            seq: 0,
        }
    }

    /// Schedule `key` at `at`, replacing any existing deadline for it.
    pub fn schedule(&mut self, key: K, at: Instant) {
        self.cancel(&key);
        let slot = (at, self.seq);
        self.seq += 1;
        self.by_deadline.insert(slot, key.clone());
        self.index.insert(key, slot);
    }

    /// Cancel the deadline for `key`. Returns true if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.by_deadline.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Returns true if `key` has a pending deadline.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// earliest first (ties in scheduling order).
    pub fn pop_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            self.index.remove(&key);
            due.push(key);
        }
        due
    }

    /// Cancel everything, returning the keys that were pending.
    pub fn clear(&mut self) -> Vec<K> {
        self.index.clear();
        std::mem::take(&mut self.by_deadline).into_values().collect()
    }

    /// Pending deadlines.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
