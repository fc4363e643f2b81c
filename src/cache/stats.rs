//! Cache Statistics Module
//!
//! Counters describing how the store has been used since it was opened.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot returned by `CacheStore::stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// `get` calls answered from a live entry
    pub hits: u64,
    /// `get` calls on absent or expired keys
    pub misses: u64,
    /// Number of live entries removed to satisfy capacity
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries currently held
    pub total_entries: usize,
    /// Summed payload size of the current entries
    pub size_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of lookups that hit.
    ///
    /// Returns hits / (hits + misses), or `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Evictions ==
    /// Adds `count` capacity evictions.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    // == Record Expirations ==
    /// Adds `count` TTL removals.
    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    // == Update Occupancy ==
    /// Replaces the entry count and byte total.
    pub fn set_occupancy(&mut self, count: usize, size_bytes: u64) {
        self.total_entries = count;
        self.size_bytes = size_bytes;
    }
}
