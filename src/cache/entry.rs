//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// Represents a single cache entry with payload and access metadata.
///
/// Also the on-disk record written by the disk mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,
    /// The stored (already serialized) payload
    pub payload: String,
    /// Measured byte length of `payload`
    pub size_bytes: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last successful read or write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of successful reads
    pub hit_count: u64,
    /// Lifetime in milliseconds measured from `created_at`
    pub ttl_ms: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry. Size is measured from the payload.
    pub fn new(key: String, payload: String, ttl_ms: u64) -> Self {
        let now = current_timestamp_ms();

        Self {
            key,
            size_bytes: payload.len() as u64,
            payload,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            ttl_ms,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is live iff `now - created_at < ttl_ms`, so an entry whose age
    /// equals its TTL is already dead and a zero TTL never yields a live entry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`is_expired`](Self::is_expired) against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) >= self.ttl_ms
    }

    // == Touch ==
    /// Records a hit.
    pub fn touch(&mut self) {
        self.last_accessed_at = current_timestamp_ms();
        self.hit_count += 1;
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        let expires = self.created_at.saturating_add(self.ttl_ms);
        expires.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation_measures_size() {
        let entry = CacheEntry::new("k".to_string(), "hello".to_string(), 60_000);

        assert_eq!(entry.payload, "hello");
        assert_eq!(entry.size_bytes, 5);
        assert_eq!(entry.hit_count, 0);
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_size_is_bytes_not_chars() {
        let entry = CacheEntry::new("k".to_string(), "éé".to_string(), 60_000);
        assert_eq!(entry.size_bytes, 4);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("k".to_string(), "v".to_string(), 50);

        assert!(!entry.is_expired());

        // Wait for expiration
        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), 0);
    }

    #[test]
    fn test_zero_ttl_is_never_live() {
        let entry = CacheEntry::new("k".to_string(), "v".to_string(), 0);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry {
            key: "k".to_string(),
            payload: "v".to_string(),
            size_bytes: 1,
            created_at: 1_000,
            last_accessed_at: 1_000,
            hit_count: 7,
            ttl_ms: 500,
        };

        assert!(!entry.is_expired_at(1_499));
        // Age equal to TTL is expired regardless of hit count
        assert!(entry.is_expired_at(1_500));
    }

    #[test]
    fn test_touch_bumps_hit_count() {
        let mut entry = CacheEntry::new("k".to_string(), "v".to_string(), 60_000);
        entry.touch();
        entry.touch();
        assert_eq!(entry.hit_count, 2);
        assert!(entry.last_accessed_at >= entry.created_at);
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = CacheEntry::new("k".to_string(), "v".to_string(), 10_000);

        let remaining = entry.ttl_remaining_ms();
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
    }
}
