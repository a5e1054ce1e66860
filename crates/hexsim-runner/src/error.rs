use hexsim_controller::{ClientError, ServerError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end a `hexsim` command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("controller failed to start: {0}")]
    Server(#[from] ServerError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("failed to install logging: {0}")]
    Logging(String),

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
