//! Context Engine - a token-budget context assembler
//!
//! Caches context fragments with TTL expiration and size-bounded LRU
//! eviction, reduces content lists to a token budget, and monitors the
//! latency, memory and cache behaviour of both.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod monitor;
pub mod optimizer;
pub mod tasks;
pub mod telemetry;
pub mod tokens;

pub use cache::{generate_key, CacheKeyParts, CacheStats, CacheStore, SharedCache};
pub use config::{CacheConfig, EngineConfig, KeyFallback, Thresholds};
pub use engine::{AssembledContext, ContextEngine};
pub use error::{EngineError, Result};
pub use models::{
    Aggressiveness, Budget, ContentItem, ContentType, OptimizationOutcome, OptimizationReport,
    OptimizeOptions,
};
pub use monitor::{
    Alert, AlertKind, ContextMetrics, PerformanceMonitor, PerformanceSample, PerformanceSummary,
};
pub use optimizer::TokenOptimizer;
pub use tasks::spawn_cleanup_task;
pub use telemetry::init_tracing;
pub use tokens::estimate_tokens;
