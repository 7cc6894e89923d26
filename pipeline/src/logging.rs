//! Tracing setup for the pipeline binary.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Stage progress and diagnostics via `RUST_LOG`,
//!   output to stderr.
//! - **Collaborator logs**: stdout/stderr of the data-preparation and
//!   simulation commands are written to files under the configured log
//!   directory, together with the JSON run report. Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset so stage progress and
/// `PartialOutput` warnings are visible.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=pipeline=debug pipeline run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
