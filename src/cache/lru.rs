//! LRU Tracker Module
//!
//! Recency ordering that decides which cache key the store gives up first
//! under size pressure.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Every touch stamps the key with a monotonically increasing tick, so the
/// smallest tick is the least recently used key. Wall-clock `last_accessed_at`
/// values can tie within a millisecond; ticks never do.
#[derive(Debug, Default)]
pub struct LruTracker {
    next_tick: u64,
    /// tick -> key, ascending = least recent first
    by_tick: BTreeMap<u64, String>,
    /// key -> current tick
    ticks: HashMap<String, u64>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    ///
    /// A tracked key loses its old tick; a new key is simply appended.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        let tick = self.next_tick;
        self.next_tick += 1;
        self.by_tick.insert(tick, key.to_string());
        self.ticks.insert(key.to_string(), tick);
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if the tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.by_tick.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.by_tick.values().next().map(String::as_str)
    }

    // == Oldest First ==
    /// Keys from least to most recently used.
    pub fn oldest_first(&self) -> impl Iterator<Item = &str> {
        self.by_tick.values().map(String::as_str)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.ticks.contains_key(key)
    }

    // == Clear ==
    /// Forgets every key. Ticks keep counting up.
    pub fn clear(&mut self) {
        self.by_tick.clear();
        self.ticks.clear();
    }
}
