use tracing_subscriber::EnvFilter;

use crate::config::config;

/// Install a fmt subscriber filtered by RUST_LOG, falling back to the configured level.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config().logging.level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
