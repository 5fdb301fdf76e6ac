//! Diagnostic tracing for the pilot binary.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Operator-facing
//! output (questions, suggested commands, command output) is written to
//! stdout by the terminal operator and is unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=pilot=debug pilot run --task "create directory reports"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
