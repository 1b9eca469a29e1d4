//! Diagnostic logging bootstrap.
//!
//! Library crates only emit `tracing` events; the binary installs the
//! subscriber here.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Filter from `configured` (normally `CODEGEN_LOG`), then `RUST_LOG`, then
/// [`DEFAULT_FILTER`]. Invalid directives fall through to the next source.
pub fn log_filter(configured: Option<&str>) -> EnvFilter {
    configured
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a stderr fmt subscriber. Returns false when one is already set.
pub fn init_logging(configured: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(configured))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
