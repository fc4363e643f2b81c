//! Cache Module
//!
//! Provides a size-bounded in-memory cache with TTL expiration, LRU eviction
//! and an optional best-effort disk mirror.

mod disk;
pub(crate) mod entry;
mod key;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use disk::DiskMirror;
pub use entry::CacheEntry;
pub use key::{content_hash, generate_key, CacheKeyParts, KEY_LENGTH};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, SharedCache};

// == Public Constants ==
/// Occupancy eviction reduces to, as a fraction of `max_size_bytes`
pub const LOW_WATER_RATIO: f64 = 0.7;
