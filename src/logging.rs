//! Structured logging bootstrap.
//!
//! Mirrors the `tracing_subscriber::fmt().with_env_filter(...)` idiom used
//! throughout the load-testing corpus (e.g. `cbaugus-rust_loadtest`,
//! `reifydb`'s bench binary) instead of the teacher's `println!` lines.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber driven by `RUST_LOG`
/// (defaults to `info` when unset). Safe to call more than once — later
/// calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
