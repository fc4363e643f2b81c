//! Budget, options and report types for `TokenOptimizer::optimize`.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::ContentItem;

// == Budget ==
/// Hard ceiling on the estimated tokens of the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_tokens: usize,
}

impl Budget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(EngineError::Configuration(
                "token budget must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// == Aggressiveness ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    /// Whitespace normalization and JSON minification only
    Conservative,
    /// Adds dictionary shorthand
    #[default]
    Moderate,
    /// Adds comment stripping for code
    Aggressive,
}

// == Optimize Options ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    pub enable_deduplication: bool,
    pub enable_compression: bool,
    pub enable_summarization: bool,
    pub enable_caching: bool,
    pub aggressiveness: Aggressiveness,
    /// Version component of per-item and whole-result cache keys
    pub cache_version: String,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            enable_deduplication: true,
            enable_compression: true,
            enable_summarization: true,
            enable_caching: true,
            aggressiveness: Aggressiveness::default(),
            cache_version: "1".to_string(),
        }
    }
}

impl OptimizeOptions {
    /// Every technique off; `optimize` then only measures.
    pub fn none() -> Self {
        Self {
            enable_deduplication: false,
            enable_compression: false,
            enable_summarization: false,
            enable_caching: false,
            ..Self::default()
        }
    }
}

// == Optimization Report ==
/// Derived per call from pre/post token estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub original_tokens: usize,
    pub optimized_tokens: usize,
    /// May be negative when nothing could be reduced
    pub savings: i64,
    pub savings_pct: f64,
    /// Stages that were enabled and changed at least one item
    pub techniques: Vec<String>,
}

impl OptimizationReport {
    pub fn new(original_tokens: usize, optimized_tokens: usize, techniques: Vec<String>) -> Self {
        let savings = original_tokens as i64 - optimized_tokens as i64;
        let savings_pct = if original_tokens == 0 {
            0.0
        } else {
            savings as f64 / original_tokens as f64 * 100.0
        };
        Self {
            original_tokens,
            optimized_tokens,
            savings,
            savings_pct,
            techniques,
        }
    }

    pub fn exceeds(&self, budget: &Budget) -> bool {
        self.optimized_tokens > budget.max_tokens
    }
}

// == Optimization Outcome ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub items: Vec<ContentItem>,
    pub report: OptimizationReport,
}
