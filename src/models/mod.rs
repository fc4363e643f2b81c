//! Data model shared by the optimizer and the engine
//!
//! Content items flowing through the optimizer and the budget, options and
//! report types that describe one `optimize` call.

pub mod content;
pub mod optimize;

// Re-export commonly used types
pub use content::{ContentItem, ContentType, ItemMetadata, Technique, EXEMPT_PRIORITY, MAX_PRIORITY};
pub use optimize::{
    Aggressiveness, Budget, OptimizationOutcome, OptimizationReport, OptimizeOptions,
};
