//! Tracing setup for binaries and tests embedding the engine.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "context_engine=info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already set, in which case
/// nothing changes.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIRECTIVE.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
