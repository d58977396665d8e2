//! Tracing subscriber setup for the binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter (`EnvFilter` syntax).
pub const LOG_ENV: &str = "ASKDOCS_LOG";

/// Installs a stderr fmt subscriber filtered by `ASKDOCS_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
