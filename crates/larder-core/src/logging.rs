//! Logging bootstrap built on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,larder_assets=debug,larder_core=info";

/// Install a fmt subscriber using `RUST_LOG` or [`DEFAULT_FILTER`].
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Install a fmt subscriber using `RUST_LOG`, falling back to `fallback`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_filter(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::trace!("Global subscriber already installed");
    }
}
