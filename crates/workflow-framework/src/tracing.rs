//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by the
//! `RUST_LOG` environment variable.
//!
//! ```bash
//! RUST_LOG=info cargo run      # state transitions only
//! RUST_LOG=debug cargo run     # full payloads and every executor attempt
//! RUST_LOG=workflow_framework=debug,billing=info cargo run
//! ```
//!
//! Runs log with structured fields (`bill_id`, `update_id`, `attempt`, `trigger`) rather
//! than formatted strings, so the output can be filtered by field in production.

/// Initializes the global subscriber. Later calls are no-ops.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
