//! Token Optimizer Module
//!
//! Fits content items into a token budget through deduplication,
//! compression, priority-aware summarization and result caching.

pub mod compress;
pub mod dedup;
mod pipeline;
pub mod summarize;


pub use pipeline::{
    TokenOptimizer, OPTIMIZER_CACHE_TTL, STAGE_CACHING, STAGE_COMPRESSION, STAGE_DEDUPLICATION,
    STAGE_SUMMARIZATION,
};
