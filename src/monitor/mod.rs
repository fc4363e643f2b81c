//! Performance Monitor Module
//!
//! Operation timing, threshold alerts, summaries and recommendations.

mod memory;
#[allow(clippy::module_inception)]
mod monitor;
mod recommendations;
mod sample;
mod summary;

pub use memory::MemoryProbe;
pub use monitor::{
    PerformanceMonitor, DEFAULT_ALERT_CAPACITY, DEFAULT_SAMPLE_CAPACITY, HIT_RATE_CHECK_EVERY,
    HIT_RATE_WINDOW,
};
pub use recommendations::recommend;
pub use sample::{Alert, AlertKind, ContextMetrics, PerformanceSample};
pub use summary::{percentile, PerformanceSummary};
