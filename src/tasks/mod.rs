//! Background Tasks Module
//!
//! Contains background tasks that run periodically while an engine is alive.
//!
//! # Tasks
//! - Expiry sweep: Removes expired cache entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
