//! # hexsim-runner
//!
//! Command line front end for the mock controller: `hexsim serve` runs a
//! controller with the simple device, configured from YAML and command line
//! flags; `hexsim monitor` and `hexsim send` are small clients for poking at
//! a running controller.

pub mod cli;
mod config;
mod error;
mod logging;
mod serve;
mod tools;

pub use config::{
    ConfigError, InitialState, LoggingSection, MetricsSection, RunnerConfig, ServerSection,
    DEFAULT_PORT,
};
pub use error::RunnerError;
pub use logging::init_tracing;
pub use serve::{ctrl_c, serve, start_controller};
pub use tools::{describe_frame, describe_status, monitor, send_command, SimpleClient};
