//! Process telemetry setup.

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to call more than once
/// (later calls are no-ops), so test harnesses and binaries can both use it.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if initialized {
        info!(service = service_name, "telemetry initialized");
    }
}
