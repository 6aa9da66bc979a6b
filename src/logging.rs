//! Tracing subscriber setup for binaries and examples.

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `default_directive` (e.g.
/// `"taskbunch=info"`) is used. Calling this more than once is harmless:
/// later calls leave the first subscriber in place.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
