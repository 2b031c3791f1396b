//! Profiling hooks based on the `puffin` crate.
//!
//! With the `profiling` feature disabled the scope macros compile to nothing.

#[cfg(feature = "profiling")]
pub use puffin::{profile_function, profile_scope};

#[cfg(not(feature = "profiling"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __larder_profile_noop {
    ($($tt:tt)*) => {};
}

#[cfg(not(feature = "profiling"))]
pub use crate::__larder_profile_noop as profile_function;
#[cfg(not(feature = "profiling"))]
pub use crate::__larder_profile_noop as profile_scope;

/// Default address for the puffin HTTP server.
pub const DEFAULT_PROFILER_ADDR: &str = "127.0.0.1:8585";

#[cfg(feature = "profiling")]
static PROFILING_SERVER: std::sync::OnceLock<puffin_http::Server> = std::sync::OnceLock::new();

/// Turn on scope collection and serve it to `puffin_viewer` at `addr`.
///
/// Returns `false` if the server could not be started.
#[cfg(feature = "profiling")]
pub fn init_profiling(addr: &str) -> bool {
    puffin::set_scopes_on(true);
    match puffin_http::Server::new(addr) {
        Ok(server) => {
            tracing::info!("Puffin profiler listening on {}", addr);
            let _ = PROFILING_SERVER.set(server);
            true
        }
        Err(e) => {
            tracing::error!("Failed to start puffin server on {}: {}", addr, e);
            false
        }
    }
}

#[cfg(not(feature = "profiling"))]
pub fn init_profiling(_addr: &str) -> bool {
    false
}

/// Mark a frame boundary. Hosts call this once per scheduler pump.
#[inline]
pub fn new_frame() {
    #[cfg(feature = "profiling")]
    puffin::GlobalProfiler::lock().new_frame();
}
