//! Tracing bootstrap for processes embedding the pipeline crates.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; `fallback_level` (typically
/// `AppConfig::log_level`) is used when it is unset. Safe to call only once
/// per process.
///
/// # Errors
///
/// Returns an error if `fallback_level` is not a valid filter directive.
pub fn init(fallback_level: &str) -> Result<(), tracing_subscriber::filter::ParseError> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}
