//! Tracing setup for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `WRAPRUN_LOG=wraprun=debug`.
pub const LOG_ENV: &str = "WRAPRUN_LOG";

/// Installs a fmt subscriber filtered by `WRAPRUN_LOG` (default `warn`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
