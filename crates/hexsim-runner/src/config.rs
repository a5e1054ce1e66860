//! YAML configuration of the `hexsim serve` command.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use hexsim_controller::{ServerConfig, SimpleSettings};
use hexsim_protocol::ControllerState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port served when neither the file nor the command line names one.
pub const DEFAULT_PORT: u16 = 5570;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

/// State the controller starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InitialState {
    #[default]
    Standby,
    Enabled,
    Fault,
}

impl From<InitialState> for ControllerState {
    fn from(state: InitialState) -> Self {
        match state {
            InitialState::Standby => ControllerState::Standby,
            InitialState::Enabled => ControllerState::Enabled,
            InitialState::Fault => ControllerState::Fault,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub telemetry_interval_ms: u64,
    pub initial_state: InitialState,
    pub reset_state_on_connect: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            telemetry_interval_ms: 100,
            initial_state: InitialState::Standby,
            reset_state_on_connect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Serve Prometheus metrics on this address. Needs the `prometheus` feature.
    pub prometheus_addr: Option<SocketAddr>,
}

// ============================================================================
// RunnerConfig
// ============================================================================

/// Everything `hexsim serve` needs. Every field has a default, so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub server: ServerSection,
    pub device: SimpleSettings,
    pub logging: LoggingSection,
    pub metrics: MetricsSection,
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // serde_yaml reads an empty document as unit, not as an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        if self.server.telemetry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.telemetry_interval_ms must be > 0".to_string(),
            ));
        }
        if !(device.min_position <= device.max_position) {
            return Err(ConfigError::Invalid(format!(
                "device.min_position ({}) must not exceed device.max_position ({})",
                device.min_position, device.max_position
            )));
        }
        if !(device.max_velocity.is_finite() && device.max_velocity > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "device.max_velocity ({}) must be > 0",
                device.max_velocity
            )));
        }
        if !(device.min_position..=device.max_position).contains(&device.initial_position) {
            return Err(ConfigError::Invalid(format!(
                "device.initial_position ({}) is outside the position limits",
                device.initial_position
            )));
        }
        if !(device.noise_std_dev >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "device.noise_std_dev ({}) must be >= 0",
                device.noise_std_dev
            )));
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            telemetry_interval: Duration::from_millis(self.server.telemetry_interval_ms),
            initial_state: self.server.initial_state.into(),
            reset_state_on_connect: self.server.reset_state_on_connect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(RunnerConfig::from_yaml("").unwrap(), RunnerConfig::default());
        assert_eq!(RunnerConfig::from_yaml("\n  \n").unwrap(), RunnerConfig::default());
        RunnerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_sections() {
        let config = RunnerConfig::from_yaml(
            r#"
server:
  port: 6000
  initial_state: fault
  reset_state_on_connect: true
device:
  max_velocity: 12.5
  seed: 3
logging:
  filter: debug
metrics:
  prometheus_addr: "127.0.0.1:9000"
"#,
        )
        .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.initial_state, InitialState::Fault);
        assert_eq!(config.device.max_velocity, 12.5);
        assert_eq!(config.device.seed, Some(3));
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(
            config.metrics.prometheus_addr,
            Some("127.0.0.1:9000".parse().unwrap())
        );

        let server = config.server_config();
        assert_eq!(server.initial_state, ControllerState::Fault);
        assert_eq!(server.telemetry_interval, Duration::from_millis(100));
        assert!(server.reset_state_on_connect);
    }

    #[test]
    fn test_unknown_state_rejected() {
        assert!(RunnerConfig::from_yaml("server:\n  initial_state: moving\n").is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = RunnerConfig::default();
        config.server.telemetry_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.device.max_velocity = 0.0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.device.min_position = 10.0;
        config.device.max_position = -10.0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.device.initial_position = 30.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RunnerConfig::load("/nonexistent/hexsim.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
