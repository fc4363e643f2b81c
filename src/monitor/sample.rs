//! Samples and alerts recorded by the performance monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context-specific figures attached to a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetrics {
    /// Estimated tokens produced by the operation
    pub tokens: Option<usize>,
    /// Whether the operation was served from cache
    pub cache_hit: Option<bool>,
    /// Number of content items involved
    pub items: Option<usize>,
}

/// One timed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    /// Process memory after minus before; negative when memory was released
    pub memory_delta_bytes: i64,
    pub context_metrics: Option<ContextMetrics>,
    pub success: bool,
}

impl PerformanceSample {
    /// Sample for callers that time themselves.
    pub fn new(operation: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            operation: operation.into(),
            started_at: Utc::now(),
            duration_ms,
            memory_delta_bytes: 0,
            context_metrics: None,
            success: true,
        }
    }

    pub fn with_memory_delta(mut self, bytes: i64) -> Self {
        self.memory_delta_bytes = bytes;
        self
    }

    pub fn with_metrics(mut self, metrics: ContextMetrics) -> Self {
        self.context_metrics = Some(metrics);
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn tokens(&self) -> Option<usize> {
        self.context_metrics.and_then(|m| m.tokens)
    }

    pub fn cache_hit(&self) -> Option<bool> {
        self.context_metrics.and_then(|m| m.cache_hit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SlowOperation,
    MemoryPressure,
    TokenLimit,
    LowCacheHitRate,
}

/// A violated threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    /// Operation that triggered it; `None` for rolling checks
    pub operation: Option<String>,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        operation: Option<String>,
        message: impl Into<String>,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            operation,
            message: message.into(),
            value,
            threshold,
        }
    }
}
