//! Token Optimizer
//!
//! Runs deduplication, compression, summarization and caching, in that order,
//! over a list of content items and reports what it saved.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{content_hash, generate_key, CacheKeyParts, CacheStore};
use crate::error::{EngineError, Result};
use crate::models::{
    Budget, ContentItem, OptimizationOutcome, OptimizationReport, OptimizeOptions, Technique,
};
use crate::optimizer::{compress, dedup, summarize};
use crate::tokens::estimate_tokens;

/// TTL of per-item and whole-result cache entries.
pub const OPTIMIZER_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

const ITEM_COMMAND: &str = "optimize-item";
const RESULT_COMMAND: &str = "optimize-result";

// == Stage Names ==
pub const STAGE_DEDUPLICATION: &str = "deduplication";
pub const STAGE_COMPRESSION: &str = "compression";
pub const STAGE_SUMMARIZATION: &str = "summarization";
pub const STAGE_CACHING: &str = "caching";

// == Token Optimizer ==
#[derive(Debug, Clone)]
pub struct TokenOptimizer {
    cache_ttl: Duration,
}

impl Default for TokenOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenOptimizer {
    pub fn new() -> Self {
        Self {
            cache_ttl: OPTIMIZER_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        Self { cache_ttl }
    }

    // == Optimize ==
    /// Reduces `items` towards `budget`.
    ///
    /// Exempt items (priority >= 8) come back byte-identical. When even the
    /// result exceeds the budget the call still succeeds; the report shows the
    /// overshoot. Without a cache store the caching stage is skipped.
    pub fn optimize(
        &self,
        items: &[ContentItem],
        budget: Budget,
        options: &OptimizeOptions,
        mut cache: Option<&mut CacheStore>,
    ) -> Result<OptimizationOutcome> {
        budget.validate()?;
        let original_tokens = total_tokens(items);

        let result_key = match (&cache, options.enable_caching) {
            (Some(_), true) => Some(result_key(items, budget, options)?),
            _ => None,
        };
        if let (Some(store), Some(key)) = (cache.as_deref_mut(), &result_key) {
            if let Some(outcome) = cached_outcome(store, key)? {
                return Ok(outcome);
            }
        }

        let mut techniques = Vec::new();
        let input_hashes: HashMap<&str, String> = items
            .iter()
            .map(|i| (i.id.as_str(), content_hash(&i.content)))
            .collect();
        let mut current: Vec<ContentItem> = items.iter().map(ContentItem::remeasured).collect();

        if options.enable_deduplication {
            let (next, replaced) = dedup::deduplicate(&current);
            if replaced > 0 {
                debug!("Deduplication replaced {} items", replaced);
                techniques.push(STAGE_DEDUPLICATION.to_string());
            }
            current = next;
        }

        if options.enable_compression {
            let mut changed = 0;
            let mut next = Vec::with_capacity(current.len());
            for item in &current {
                if item.is_exempt() || item.is_back_reference() {
                    next.push(item.clone());
                    continue;
                }
                match compress::compress(item, options.aggressiveness)? {
                    Some(compressed) => {
                        changed += 1;
                        next.push(compressed);
                    }
                    None => next.push(item.clone()),
                }
            }
            if changed > 0 {
                debug!("Compression rewrote {} items", changed);
                techniques.push(STAGE_COMPRESSION.to_string());
            }
            current = next;
        }

        if options.enable_summarization && total_tokens(&current) > budget.max_tokens {
            let next = summarize_to_budget(&current, budget);
            if next != current {
                techniques.push(STAGE_SUMMARIZATION.to_string());
            }
            current = next;
        }

        if options.enable_caching {
            if let Some(store) = cache.as_deref_mut() {
                let (next, reused) =
                    self.reuse_cached_items(store, &current, &input_hashes, options)?;
                if reused > 0 {
                    debug!("Caching reused {} items", reused);
                    techniques.push(STAGE_CACHING.to_string());
                }
                current = next;
            }
        }

        let report = OptimizationReport::new(original_tokens, total_tokens(&current), techniques);
        let outcome = OptimizationOutcome {
            items: current,
            report,
        };

        if let (Some(store), Some(key)) = (cache.as_deref_mut(), result_key) {
            self.store_or_skip(store, key, serde_json::to_string(&outcome)?)?;
        }
        Ok(outcome)
    }

    /// Looks up each non-exempt item by `(id, cache_version)` plus the hash of
    /// the content it was given as input, so a reused id with new content
    /// never sees the old entry.
    ///
    /// A live hit replaces the content when it is no larger than what the
    /// pipeline produced; otherwise the fresh content is written back.
    fn reuse_cached_items(
        &self,
        store: &mut CacheStore,
        items: &[ContentItem],
        input_hashes: &HashMap<&str, String>,
        options: &OptimizeOptions,
    ) -> Result<(Vec<ContentItem>, usize)> {
        let mut reused = 0;
        let mut out = Vec::with_capacity(items.len());

        for item in items {
            if item.is_exempt() {
                out.push(item.clone());
                continue;
            }

            let input_hash = input_hashes
                .get(item.id.as_str())
                .map(String::as_str)
                .unwrap_or_default();
            let key = item_key(&item.id, &options.cache_version, input_hash);
            match store.get(&key)? {
                Some(cached) if cached == item.content => out.push(item.clone()),
                Some(cached) if estimate_tokens(&cached) <= estimate_tokens(&item.content) => {
                    reused += 1;
                    out.push(item.rewritten(cached, Technique::Cached));
                }
                _ => {
                    self.store_or_skip(store, key, item.content.clone())?;
                    out.push(item.clone());
                }
            }
        }
        Ok((out, reused))
    }

    /// Payloads larger than the whole store are simply not cached.
    fn store_or_skip(&self, store: &mut CacheStore, key: String, payload: String) -> Result<()> {
        match store.set(key, payload, Some(self.cache_ttl)) {
            Err(EngineError::EntryTooLarge { key, size, .. }) => {
                debug!("Not caching {} ({} bytes): larger than the store", key, size);
                Ok(())
            }
            other => other,
        }
    }
}

/// Summarizes non-exempt items, highest priority first, towards 80% of the
/// budget left over by exempt items, then hard-fits the result to the budget.
fn summarize_to_budget(items: &[ContentItem], budget: Budget) -> Vec<ContentItem> {
    let target = (budget.max_tokens as f64 * summarize::SAFETY_RATIO).floor() as usize;
    let exempt_tokens: usize = items
        .iter()
        .filter(|i| i.is_exempt())
        .map(|i| estimate_tokens(&i.content))
        .sum();
    let flexible_tokens = total_tokens(items) - exempt_tokens;

    let available = target.saturating_sub(exempt_tokens);
    let ratio = if flexible_tokens == 0 {
        1.0
    } else {
        (available as f64 / flexible_tokens as f64).min(1.0)
    };
    debug!(
        "Summarizing {} flexible tokens at ratio {:.2} (exempt {})",
        flexible_tokens, ratio, exempt_tokens
    );

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[b].priority.cmp(&items[a].priority));

    let mut out = items.to_vec();
    for idx in order {
        if !out[idx].is_exempt() {
            out[idx] = summarize::summarize(&out[idx], ratio);
        }
    }

    let fitted = summarize::fit_to_budget(&out, budget.max_tokens);
    if exempt_tokens > budget.max_tokens {
        warn!(
            "Exempt items alone need {} tokens, budget is {}",
            exempt_tokens, budget.max_tokens
        );
    }
    fitted
}

fn cached_outcome(store: &mut CacheStore, key: &str) -> Result<Option<OptimizationOutcome>> {
    let Some(payload) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<OptimizationOutcome>(&payload) {
        Ok(mut outcome) => {
            if !outcome.report.techniques.iter().any(|t| t == STAGE_CACHING) {
                outcome.report.techniques.push(STAGE_CACHING.to_string());
            }
            debug!("Optimization result served from cache ({})", key);
            Ok(Some(outcome))
        }
        Err(e) => {
            warn!("Discarding unreadable cached optimization {}: {}", key, e);
            Ok(None)
        }
    }
}

fn total_tokens(items: &[ContentItem]) -> usize {
    items.iter().map(|i| estimate_tokens(&i.content)).sum()
}

fn item_key(id: &str, version: &str, input_hash: &str) -> String {
    generate_key(
        &CacheKeyParts::new(ITEM_COMMAND, vec![id.to_string()], version)
            .with_context_hash(input_hash),
    )
}

/// Fingerprint of everything that determines an outcome.
fn result_key(items: &[ContentItem], budget: Budget, options: &OptimizeOptions) -> Result<String> {
    let fingerprint = content_hash(&serde_json::to_string(&(items, budget, options))?);
    Ok(generate_key(
        &CacheKeyParts::new(RESULT_COMMAND, Vec::new(), options.cache_version.clone())
            .with_context_hash(fingerprint),
    ))
}
