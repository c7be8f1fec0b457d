//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Logs go to stderr
/// so CSV written to stdout stays clean. Safe to call more than once; later
/// calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
