//! Integration Tests for the Context Engine
//!
//! Drives the cache, optimizer and monitor through the public API, including
//! a full engine restart over a persisted cache directory.

use std::time::Duration;

use context_engine::{
    generate_key, AlertKind, Budget, CacheKeyParts, CacheStore, ContentItem, ContentType,
    ContextEngine, EngineConfig, EngineError, KeyFallback, OptimizeOptions, PerformanceMonitor,
    Thresholds, TokenOptimizer,
};
use tempfile::TempDir;

// == Helper Functions ==

fn in_memory_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cache.max_size_bytes = 256 * 1024;
    config
}

fn persistent_config(dir: &TempDir) -> EngineConfig {
    let mut config = in_memory_config();
    config.cache.persist_to_disk = true;
    config.cache.cache_dir = dir.path().to_path_buf();
    config
}

fn prose(sentences: usize, tag: &str) -> String {
    (0..sentences)
        .map(|i| format!("The {} paragraph sentence {} explains one more detail.", tag, i))
        .collect::<Vec<_>>()
        .join(" ")
}

// == Cache Store ==

#[test]
fn test_store_evicts_to_low_water_mark() {
    let mut store = CacheStore::new(1000, 60_000);
    let payload = "x".repeat(300);

    for i in 0..5 {
        store
            .set(format!("entry{}", i), payload.clone(), None)
            .unwrap();
        assert!(store.size_bytes() <= 1000);
        if i == 3 {
            assert!(store.size_bytes() <= 700);
            assert_eq!(store.stats().unwrap().evictions, 2);
        }
    }
    assert_eq!(store.get("entry0").unwrap(), None);
    assert_eq!(store.get("entry4").unwrap().as_deref(), Some(payload.as_str()));
}

#[test]
fn test_generate_key_is_stable() {
    let parts = CacheKeyParts::new(
        "context",
        vec!["global".to_string(), "phase".to_string()],
        "3",
    );
    let first = generate_key(&parts);
    let second = generate_key(&parts.clone());

    assert_eq!(first, second);
    assert_eq!(first.len(), 16);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
}

// == Optimizer ==

#[test]
fn test_priority_nine_survives_tight_budget() {
    let high = ContentItem::new("brief", ContentType::Documentation, 9, prose(5, "critical"));
    let mid = ContentItem::new("notes", ContentType::Text, 5, prose(30, "useful"));
    let low = ContentItem::new("history", ContentType::Text, 2, prose(30, "optional"));
    let budget = Budget::new(high.token_estimate);

    let outcome = TokenOptimizer::new()
        .optimize(
            &[high.clone(), mid.clone(), low.clone()],
            budget,
            &OptimizeOptions::default(),
            None,
        )
        .unwrap();

    assert_eq!(outcome.items[0].content, high.content);
    assert!(outcome.items[1].token_estimate < mid.token_estimate / 2);
    assert!(outcome.items[2].token_estimate < low.token_estimate / 2);
    assert!(outcome.report.savings_pct > 0.0);
}

// == Monitor ==

#[test]
fn test_failed_measure_is_recorded_and_propagated() {
    let mut monitor = PerformanceMonitor::new(Thresholds::default()).unwrap();

    let result: anyhow::Result<()> = monitor.measure("op", || Err(anyhow::anyhow!("boom")));

    assert_eq!(result.unwrap_err().to_string(), "boom");
    let summary = monitor.summary(Some("op"), None).unwrap();
    assert_eq!(summary.count, 1);
    assert_eq!(summary.error_count, 1);
}

// == Engine ==

#[tokio::test]
async fn test_repeat_assembly_is_served_from_cache() {
    let mut engine = ContextEngine::start(in_memory_config()).await.unwrap();
    let items = vec![
        ContentItem::new("a", ContentType::Text, 4, prose(20, "first")),
        ContentItem::new("b", ContentType::Text, 4, prose(20, "second")),
    ];
    let budget = Budget::new(150);

    let first = engine
        .assemble(&items, budget, &OptimizeOptions::default())
        .await
        .unwrap();
    let second = engine
        .assemble(&items, budget, &OptimizeOptions::default())
        .await
        .unwrap();

    assert_eq!(first.outcome.items, second.outcome.items);
    assert!(second
        .outcome
        .report
        .techniques
        .contains(&"caching".to_string()));

    let summary = engine.summary(Some("assemble"), None).unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.cache_hit_rate, Some(50.0));
    engine.dispose().await;
}

#[tokio::test]
async fn test_exact_fallback_ignores_versionless_entry() {
    let mut engine = ContextEngine::start(in_memory_config()).await.unwrap();
    let stored = CacheKeyParts::new("context", vec!["task".to_string()], "");
    let wanted = CacheKeyParts::new("context", vec!["task".to_string()], "2");

    engine
        .store_context(&stored, "old payload".to_string(), None)
        .await
        .unwrap();

    assert_eq!(engine.cached_context(&wanted).await.unwrap(), None);
    engine.dispose().await;
}

#[tokio::test]
async fn test_graceful_fallback_serves_versionless_entry() {
    let mut config = in_memory_config();
    config.key_fallback = KeyFallback::Graceful;
    let mut engine = ContextEngine::start(config).await.unwrap();
    let stored = CacheKeyParts::new("context", vec!["task".to_string()], "");
    let wanted = CacheKeyParts::new("context", vec!["task".to_string()], "2");

    engine
        .store_context(&stored, "old payload".to_string(), None)
        .await
        .unwrap();

    assert_eq!(
        engine.cached_context(&wanted).await.unwrap().as_deref(),
        Some("old payload")
    );
    engine.dispose().await;
}

#[tokio::test]
async fn test_contexts_survive_restart_with_disk_mirror() {
    let dir = TempDir::new().unwrap();
    let parts = CacheKeyParts::new("context", vec!["global".to_string()], "1");

    let mut engine = ContextEngine::start(persistent_config(&dir)).await.unwrap();
    engine
        .store_context(&parts, "persisted".to_string(), Some(Duration::from_secs(600)))
        .await
        .unwrap();
    engine.dispose().await;

    let mut engine = ContextEngine::start(persistent_config(&dir)).await.unwrap();
    assert_eq!(
        engine.cached_context(&parts).await.unwrap().as_deref(),
        Some("persisted")
    );
    engine.dispose().await;
}

#[tokio::test]
async fn test_token_alert_reaches_subscribers() {
    let mut config = in_memory_config();
    config.thresholds.max_tokens_per_operation = 10;
    let mut engine = ContextEngine::start(config).await.unwrap();
    let mut alerts = engine.subscribe_alerts().unwrap();

    let items = vec![ContentItem::new("big", ContentType::Text, 9, prose(4, "pinned"))];
    engine
        .assemble(&items, Budget::new(1000), &OptimizeOptions::default())
        .await
        .unwrap();

    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.kind, AlertKind::TokenLimit);
    assert_eq!(alert.threshold, 10.0);
    engine.dispose().await;
}

#[tokio::test]
async fn test_invalid_pattern_is_rejected() {
    let engine = ContextEngine::start(in_memory_config()).await.unwrap();
    assert!(matches!(
        engine.invalidate(Some("(unclosed")).await,
        Err(EngineError::InvalidPattern(_))
    ));
    engine.dispose().await;
}
