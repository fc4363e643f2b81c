//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;
use crate::error::EngineError;

/// Spawns a task that sweeps expired entries from `cache` every `interval`.
///
/// The task stops on its own once the store has been disposed; otherwise
/// abort the returned handle on shutdown.
///
/// # Example
/// ```ignore
/// let cache = CacheStore::new(1024 * 1024, 60_000).into_shared();
/// let sweep = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task(cache: SharedCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweep with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup_expired()
            };

            match removed {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(n) => info!("Expiry sweep: removed {} expired entries", n),
                Err(EngineError::NotInitialized(_)) => {
                    debug!("Cache disposed, stopping expiry sweep");
                    break;
                }
                Err(e) => debug!("Expiry sweep failed: {}", e),
            }
        }
    })
}
