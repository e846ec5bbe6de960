//! Structured logging setup and the in-process metrics surface exposed at
//! `/metrics`.

mod metrics;

pub use metrics::{MetricsCollector, MetricsSnapshot};

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber reading `RUST_LOG` (defaulting to
/// `info`), emitting JSON lines to stdout. Call once at process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .init();
}
