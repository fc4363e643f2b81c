//! Context Engine
//!
//! Composition root wiring the cache store, token optimizer, performance
//! monitor and expiry sweep together. Every public call is measured.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{generate_key, CacheKeyParts, CacheStats, CacheStore, SharedCache};
use crate::config::{EngineConfig, KeyFallback};
use crate::error::Result;
use crate::models::{Budget, ContentItem, OptimizationOutcome, OptimizeOptions};
use crate::monitor::{Alert, ContextMetrics, PerformanceMonitor, PerformanceSummary};
use crate::optimizer::{TokenOptimizer, STAGE_CACHING};
use crate::tasks::spawn_cleanup_task;

pub const OP_ASSEMBLE: &str = "assemble";
pub const OP_CACHED_CONTEXT: &str = "cached_context";
pub const OP_STORE_CONTEXT: &str = "store_context";

/// Result of [`ContextEngine::assemble`].
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub outcome: OptimizationOutcome,
    /// Set when the optimized items still exceed the budget
    pub recommendation: Option<String>,
}

impl AssembledContext {
    pub fn within_budget(&self) -> bool {
        self.recommendation.is_none()
    }
}

pub struct ContextEngine {
    cache: SharedCache,
    optimizer: TokenOptimizer,
    monitor: PerformanceMonitor,
    config: EngineConfig,
    sweep: Option<JoinHandle<()>>,
}

impl ContextEngine {
    /// Validates `config`, opens the store (reloading the disk mirror when
    /// enabled) and starts the expiry sweep.
    pub async fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let monitor = PerformanceMonitor::new(config.thresholds.clone())?;
        let cache = CacheStore::open(&config.cache).await?.into_shared();
        let sweep = spawn_cleanup_task(
            cache.clone(),
            Duration::from_secs(config.cache.sweep_interval_secs),
        );

        info!(
            "Context engine started: max_size={} bytes, default_ttl={} ms, persist={}, key_fallback={:?}",
            config.cache.max_size_bytes,
            config.cache.default_ttl_ms,
            config.cache.persist_to_disk,
            config.key_fallback
        );

        Ok(Self {
            cache,
            optimizer: TokenOptimizer::new(),
            monitor,
            config,
            sweep: Some(sweep),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the shared store, for callers that manage entries directly.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    // == Assemble ==
    /// Optimizes `items` into `budget`, consulting and filling the cache.
    ///
    /// An over-budget result is still returned, with a recommendation.
    pub async fn assemble(
        &mut self,
        items: &[ContentItem],
        budget: Budget,
        options: &OptimizeOptions,
    ) -> Result<AssembledContext> {
        let cache = &self.cache;
        let optimizer = &self.optimizer;
        let item_count = items.len();

        let outcome = self
            .monitor
            .measure_async_with_metrics(
                OP_ASSEMBLE,
                async move {
                    let mut store = cache.write().await;
                    optimizer.optimize(items, budget, options, Some(&mut *store))
                },
                |outcome: &OptimizationOutcome| {
                    Some(ContextMetrics {
                        tokens: Some(outcome.report.optimized_tokens),
                        cache_hit: Some(
                            outcome.report.techniques.iter().any(|t| t == STAGE_CACHING),
                        ),
                        items: Some(item_count),
                    })
                },
            )
            .await?;

        let recommendation = over_budget_advice(&outcome, budget);
        if let Some(advice) = &recommendation {
            warn!("{}", advice);
        }
        Ok(AssembledContext {
            outcome,
            recommendation,
        })
    }

    // == Context Lookup ==
    /// Looks up a stored context, following the configured key fallback.
    ///
    /// With [`KeyFallback::Graceful`] a miss on the exact key retries without
    /// the version, then with the command alone. Those matches may be stale.
    pub async fn cached_context(&mut self, parts: &CacheKeyParts) -> Result<Option<String>> {
        let cache = &self.cache;
        let candidates = lookup_chain(parts, self.config.key_fallback);

        self.monitor
            .measure_async_with_metrics(
                OP_CACHED_CONTEXT,
                first_hit(cache, parts, candidates),
                |found: &Option<String>| {
                    Some(ContextMetrics {
                        cache_hit: Some(found.is_some()),
                        ..ContextMetrics::default()
                    })
                },
            )
            .await
    }

    /// Stores `payload` under the key derived from `parts` and returns the key.
    pub async fn store_context(
        &mut self,
        parts: &CacheKeyParts,
        payload: String,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let cache = &self.cache;
        let key = generate_key(parts);

        self.monitor
            .measure_async(OP_STORE_CONTEXT, async move {
                let stored = cache.write().await.set(key.clone(), payload, ttl);
                stored.map(|()| key)
            })
            .await
    }

    /// Removes entries whose key matches `pattern`, or everything.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        self.cache.write().await.invalidate(pattern)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.read().await.stats()
    }

    // == Monitoring ==
    pub fn summary(
        &self,
        operation: Option<&str>,
        window: Option<Duration>,
    ) -> Result<PerformanceSummary> {
        self.monitor.summary(operation, window)
    }

    pub fn recommendations(&self) -> Result<Vec<String>> {
        self.monitor.recommendations()
    }

    pub fn subscribe_alerts(&self) -> Result<broadcast::Receiver<Alert>> {
        self.monitor.subscribe()
    }

    // == Dispose ==
    /// Stops the sweep, flushes the disk mirror and drops all state.
    pub async fn dispose(mut self) {
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
        self.cache.write().await.dispose().await;
        self.monitor.dispose();
        info!("Context engine disposed");
    }
}

async fn first_hit(
    cache: &SharedCache,
    parts: &CacheKeyParts,
    candidates: Vec<String>,
) -> Result<Option<String>> {
    let mut store = cache.write().await;
    for (attempt, key) in candidates.iter().enumerate() {
        if let Some(payload) = store.get(key)? {
            if attempt > 0 {
                warn!(
                    "Serving fallback context for '{}' from key variant {} ({})",
                    parts.command, attempt, key
                );
            }
            return Ok(Some(payload));
        }
    }
    debug!("No cached context for '{}'", parts.command);
    Ok(None)
}

/// Keys tried by a lookup, most specific first, without repeats.
fn lookup_chain(parts: &CacheKeyParts, fallback: KeyFallback) -> Vec<String> {
    let mut keys = vec![generate_key(parts)];
    if fallback == KeyFallback::Graceful {
        for variant in [parts.without_version(), parts.command_only()] {
            let key = generate_key(&variant);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

fn over_budget_advice(outcome: &OptimizationOutcome, budget: Budget) -> Option<String> {
    if !outcome.report.exceeds(&budget) {
        return None;
    }
    Some(format!(
        "Context needs {} tokens but the budget is {}: raise the budget or lower the priority of items that must be kept intact",
        outcome.report.optimized_tokens, budget.max_tokens
    ))
}
