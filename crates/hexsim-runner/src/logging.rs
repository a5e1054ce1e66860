//! Tracing subscriber set-up.

use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;

/// Install the global fmt subscriber.
///
/// `RUST_LOG`, when set and valid, overrides `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<(), RunnerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| RunnerError::Logging(format!("bad filter {default_filter:?}: {e}")))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| RunnerError::Logging(e.to_string()))
}
