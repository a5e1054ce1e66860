//! Command line interface.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hexsim_protocol::COMMAND_PARAM_COUNT;

use crate::config::{ConfigError, InitialState, RunnerConfig};

#[derive(Debug, Parser)]
#[command(name = "hexsim", version, about = "Mock hexapod/rotator low-level controller")]
pub struct Cli {
    /// Log filter (tracing EnvFilter syntax). RUST_LOG takes precedence.
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a mock controller with the simple device.
    Serve(ServeArgs),
    /// Connect to a controller and print the frames it writes.
    Monitor(MonitorArgs),
    /// Send one command and print its status.
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// YAML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub telemetry_interval_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub initial_state: Option<InitialState>,

    /// Return to the initial state whenever a client connects.
    #[arg(long)]
    pub reset_state_on_connect: bool,

    /// Serve Prometheus metrics here (needs the `prometheus` feature).
    #[arg(long)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl ServeArgs {
    /// Load the configuration file, if any, and apply command line overrides.
    pub fn load_config(&self, log_filter: Option<&str>) -> Result<RunnerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(interval) = self.telemetry_interval_ms {
            config.server.telemetry_interval_ms = interval;
        }
        if let Some(state) = self.initial_state {
            config.server.initial_state = state;
        }
        if self.reset_state_on_connect {
            config.server.reset_state_on_connect = true;
        }
        if let Some(addr) = self.prometheus_addr {
            config.metrics.prometheus_addr = Some(addr);
        }
        if let Some(filter) = log_filter {
            config.logging.filter = filter.to_string();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    #[arg(long, default_value = "127.0.0.1:5570")]
    pub addr: String,

    /// Stop after this many frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[arg(long, default_value = "127.0.0.1:5570")]
    pub addr: String,

    #[arg(long)]
    pub code: u32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param1: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param2: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param3: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param4: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param5: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub param6: f64,
}

impl SendArgs {
    pub fn params(&self) -> [f64; COMMAND_PARAM_COUNT] {
        [
            self.param1,
            self.param2,
            self.param3,
            self.param4,
            self.param5,
            self.param6,
        ]
    }
}
