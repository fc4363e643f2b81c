//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration, a byte-size bound and an optional disk mirror.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, DiskMirror, LruTracker, LOW_WATER_RATIO};
use crate::config::CacheConfig;
use crate::error::{EngineError, Result};

/// Store shared between its owner and the background sweep task.
pub type SharedCache = Arc<RwLock<CacheStore>>;

const COMPONENT: &str = "CacheStore";

// == Cache Store ==
/// Main cache storage with size-bounded LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Upper bound on the summed size of entries
    max_size_bytes: u64,
    /// Summed size of entries currently held
    current_size_bytes: u64,
    /// Default TTL in milliseconds for entries without explicit TTL
    default_ttl_ms: u64,
    mirror: Option<DiskMirror>,
    disposed: bool,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an in-memory store.
    ///
    /// # Arguments
    /// * `max_size_bytes` - Maximum summed payload size
    /// * `default_ttl_ms` - Default TTL in milliseconds for entries without explicit TTL
    pub fn new(max_size_bytes: u64, default_ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_size_bytes,
            current_size_bytes: 0,
            default_ttl_ms,
            mirror: None,
            disposed: false,
        }
    }

    // == Open ==
    /// Creates a store from configuration, opening and reloading the disk
    /// mirror when `persist_to_disk` is set.
    ///
    /// A mirror that cannot be opened is logged and the store runs memory-only.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        if config.max_size_bytes == 0 {
            return Err(EngineError::Configuration(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }

        let mut store = Self::new(config.max_size_bytes, config.default_ttl_ms);
        if !config.persist_to_disk {
            return Ok(store);
        }

        match DiskMirror::open(&config.cache_dir).await {
            Ok((mirror, persisted)) => {
                let count = persisted.len();
                // Mirror first, so entries evicted while reloading leave the disk too
                store.mirror = Some(mirror);
                for entry in persisted {
                    if entry.size_bytes > store.max_size_bytes {
                        if let Some(mirror) = &store.mirror {
                            mirror.remove(&entry.key);
                        }
                        continue;
                    }
                    store.admit(entry);
                }
                info!(
                    "Cache store restored {} of {} entries from disk",
                    store.entries.len(),
                    count
                );
            }
            Err(e) => {
                warn!("Disk mirror unavailable, continuing in memory only: {}", e);
            }
        }
        Ok(store)
    }

    /// Wraps the store for use with the background sweep task.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    // == Set ==
    /// Stores a payload with optional TTL.
    ///
    /// If the key already exists, the payload is overwritten and TTL is reset.
    /// If admitting the entry would exceed `max_size_bytes`, least recently used
    /// entries are evicted first, down to the low-water mark.
    pub fn set(&mut self, key: impl Into<String>, payload: String, ttl: Option<Duration>) -> Result<()> {
        self.ensure_live()?;
        let key = key.into();
        let size = payload.len() as u64;

        if size > self.max_size_bytes {
            return Err(EngineError::EntryTooLarge {
                key,
                size,
                max: self.max_size_bytes,
            });
        }

        let ttl_ms = ttl.map(|t| t.as_millis() as u64).unwrap_or(self.default_ttl_ms);
        let entry = CacheEntry::new(key, payload, ttl_ms);
        if let Some(mirror) = &self.mirror {
            mirror.write(&entry);
        }
        self.admit(entry);

        Ok(())
    }

    /// Serializes `value` as JSON and stores it.
    ///
    /// Serialization failure is returned and nothing is admitted.
    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.ensure_live()?;
        let payload = serde_json::to_string(value)?;
        self.set(key, payload, ttl)
    }

    // == Get ==
    /// Retrieves a payload by key, `None` on a miss.
    ///
    /// Expired entries are removed (memory and disk) and counted as misses.
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.ensure_live()?;

        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return Ok(None);
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            self.remove_entry(key);
            if let Some(mirror) = &self.mirror {
                mirror.remove(key);
            }
            self.stats.record_expirations(1);
            self.stats.record_miss();
            debug!("Cache entry {} expired on read", key);
            return Ok(None);
        }

        let payload = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                entry.payload.clone()
            }
            None => return Ok(None),
        };
        self.stats.record_hit();
        self.lru.touch(key);
        Ok(Some(payload))
    }

    /// Reads a JSON payload back into `T`.
    pub fn get_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Metadata snapshot for a key without counting a hit.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.ensure_live()?;
        Ok(self.entries.get(key).filter(|e| !e.is_expired()).cloned())
    }

    // == Invalidate ==
    /// Removes every entry when `pattern` is `None`, otherwise every entry whose
    /// key matches the regular expression. Returns the number removed.
    pub fn invalidate(&mut self, pattern: Option<&str>) -> Result<usize> {
        self.ensure_live()?;

        let Some(pattern) = pattern else {
            let count = self.entries.len();
            self.entries.clear();
            self.lru.clear();
            self.current_size_bytes = 0;
            if let Some(mirror) = &self.mirror {
                mirror.clear();
            }
            self.sync_occupancy();
            info!("Cache invalidated: cleared {} entries", count);
            return Ok(count);
        };

        let matcher = Regex::new(pattern).map_err(|e| EngineError::InvalidPattern(e.to_string()))?;
        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();

        for key in &matching {
            self.remove_entry(key);
            if let Some(mirror) = &self.mirror {
                mirror.remove(key);
            }
        }
        self.sync_occupancy();
        info!("Cache invalidated {} entries matching '{}'", matching.len(), pattern);
        Ok(matching.len())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> Result<usize> {
        self.ensure_live()?;

        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
            if let Some(mirror) = &self.mirror {
                mirror.remove(key);
            }
        }

        self.stats.record_expirations(expired_keys.len());
        self.sync_occupancy();
        Ok(expired_keys.len())
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        self.ensure_live()?;
        Ok(self.stats.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed payload size of the entries held.
    pub fn size_bytes(&self) -> u64 {
        self.current_size_bytes
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn keys(&self) -> Vec<String> {
        self.lru.oldest_first().map(str::to_string).collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // == Dispose ==
    /// Drops all in-memory state and flushes pending disk writes.
    ///
    /// Every later call returns `EngineError::NotInitialized`.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.entries.clear();
        self.lru.clear();
        self.current_size_bytes = 0;
        if let Some(mirror) = self.mirror.take() {
            mirror.flush().await;
        }
        info!("Cache store disposed");
    }

    // == Internals ==
    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(EngineError::NotInitialized(COMPONENT))
        } else {
            Ok(())
        }
    }

    /// Inserts an entry already known to fit.
    fn admit(&mut self, entry: CacheEntry) {
        if entry.size_bytes > self.max_size_bytes {
            return;
        }
        // Overwrite case: the old payload no longer counts
        self.remove_entry(&entry.key);
        if self.current_size_bytes + entry.size_bytes > self.max_size_bytes {
            self.evict_for(entry.size_bytes);
        }
        self.current_size_bytes += entry.size_bytes;
        self.lru.touch(&entry.key);
        self.entries.insert(entry.key.clone(), entry);
        self.sync_occupancy();
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.lru.remove(key);
        self.current_size_bytes -= removed.size_bytes;
        Some(removed)
    }

    /// Evicts least recently used entries until the incoming payload fits
    /// under the low-water mark. When the payload alone exceeds the mark,
    /// eviction continues only until it fits under the hard limit.
    fn evict_for(&mut self, incoming: u64) {
        let low_water = (self.max_size_bytes as f64 * LOW_WATER_RATIO) as u64;
        let target = if incoming <= low_water {
            low_water
        } else {
            self.max_size_bytes
        };

        let before = self.current_size_bytes;
        let mut evicted = 0usize;
        while self.current_size_bytes + incoming > target {
            let Some(key) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size_bytes -= entry.size_bytes;
                if let Some(mirror) = &self.mirror {
                    mirror.remove(&key);
                }
                evicted += 1;
            }
        }

        self.stats.record_evictions(evicted);
        self.sync_occupancy();
        debug!(
            "Evicted {} entries, freed {} bytes",
            evicted,
            before - self.current_size_bytes
        );
    }

    fn sync_occupancy(&mut self) {
        self.stats
            .set_occupancy(self.entries.len(), self.current_size_bytes);
    }
}
