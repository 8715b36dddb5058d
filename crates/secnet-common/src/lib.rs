//! Shared utilities for secnet binaries.

#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Initialize tracing with a specific default level.
///
/// `RUST_LOG` takes precedence over `default_level` when set. Logs go to
/// stderr so that stdout stays clean for echoed payloads.
pub fn init_tracing_with_default(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
