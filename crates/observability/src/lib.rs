//! Process-wide tracing/logging setup for tasklift deployments.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process, reading the filter from `RUST_LOG`
/// and defaulting to `info`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with an explicit default filter directive, still
/// overridable via `RUST_LOG`.
pub fn init_with_filter(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // JSON logs + timestamps; workers log structured fields per transition.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
