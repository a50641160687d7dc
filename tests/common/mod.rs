//! Shared setup for integration tests

use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG` overrides the default level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pbo_rank=warn")),
        )
        .with_test_writer()
        .try_init();
}
