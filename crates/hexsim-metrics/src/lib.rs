//! Metrics infrastructure for the mock low-level controller.
//!
//! This crate declares every metric the controller records as a structured
//! [`Metric`] constant, so names and metadata live in one place. It re-exports
//! the `metrics` crate; recording is a no-op until a recorder is installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use hexsim_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("simple").with_command(4);
//! metrics::counter!(metric_defs::COMMANDS_RECEIVED.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use hexsim_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["device"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to declare metrics at compile time.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "hexsim.command.received").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the controller.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on every controller metric.
    pub const STANDARD_LABELS: &[&str] = &["device"];

    /// Labels on per-command metrics.
    pub const COMMAND_LABELS: &[&str] = &["device", "code"];

    // ========================================================================
    // Command Path
    // ========================================================================

    /// Command records read from the client.
    pub const COMMANDS_RECEIVED: Metric = Metric::counter("hexsim.command.received")
        .with_description("Command records read from the client")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Commands acknowledged with ACK.
    pub const COMMANDS_ACKED: Metric = Metric::counter("hexsim.command.acked")
        .with_description("Commands acknowledged with ACK")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Commands rejected with NO_ACK, including unrecognized ones.
    pub const COMMANDS_REJECTED: Metric = Metric::counter("hexsim.command.rejected")
        .with_description("Commands rejected with NO_ACK")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Handler invocations that failed unexpectedly (error or panic).
    pub const COMMAND_FAILURES: Metric = Metric::counter("hexsim.command.failures")
        .with_description("Command handlers that failed unexpectedly")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Estimated duration reported in ACKs.
    pub const COMMAND_DURATION: Metric = Metric::histogram("hexsim.command.duration_s")
        .with_description("Estimated command duration reported in ACKs")
        .with_unit(Unit::Seconds)
        .with_labels(COMMAND_LABELS);

    // ========================================================================
    // Publication
    // ========================================================================

    /// Telemetry frames written.
    pub const TELEMETRY_PUBLISHED: Metric = Metric::counter("hexsim.telemetry.published")
        .with_description("Telemetry frames written")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Config frames written.
    pub const CONFIG_PUBLISHED: Metric = Metric::counter("hexsim.config.published")
        .with_description("Config frames written")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Client connections admitted.
    pub const CONNECTIONS_ACCEPTED: Metric = Metric::counter("hexsim.connection.accepted")
        .with_description("Client connections admitted")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Connections closed because a client was already connected.
    pub const CONNECTIONS_REJECTED: Metric = Metric::counter("hexsim.connection.rejected")
        .with_description("Connections refused because a client was already connected")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// 1 while a client is connected, else 0.
    pub const CONNECTED: Metric = Metric::gauge("hexsim.connection.connected")
        .with_description("Whether a client is connected")
        .with_labels(STANDARD_LABELS);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Command path
        &COMMANDS_RECEIVED,
        &COMMANDS_ACKED,
        &COMMANDS_REJECTED,
        &COMMAND_FAILURES,
        &COMMAND_DURATION,
        // Publication
        &TELEMETRY_PUBLISHED,
        &CONFIG_PUBLISHED,
        // Connection lifecycle
        &CONNECTIONS_ACCEPTED,
        &CONNECTIONS_REJECTED,
        &CONNECTED,
    ];
}

/// Metric labels identifying the device and, for command metrics, the opcode.
///
/// ```rust
/// use hexsim_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("simple").with_command(4);
/// assert_eq!(labels.to_labels().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Device name.
    pub device: String,
    /// Command opcode, for per-command metrics.
    pub code: Option<u32>,
}

impl MetricLabels {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            code: None,
        }
    }

    /// Returns a copy labelled with a command opcode.
    pub fn with_command(&self, code: u32) -> Self {
        Self {
            device: self.device.clone(),
            code: Some(code),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("device", self.device.clone())];
        if let Some(code) = self.code {
            labels.push(("code", code.to_string()));
        }
        labels
    }
}

/// Describes all metrics used by the controller.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Installs a Prometheus recorder serving `/metrics` on `addr` and describes all metrics.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn install_prometheus_exporter(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels_new() {
        let labels = MetricLabels::new("simple");
        assert_eq!(labels.device, "simple");
        assert_eq!(labels.code, None);
        assert_eq!(labels.to_labels(), vec![("device", "simple".to_string())]);
    }

    #[test]
    fn test_metric_labels_with_command() {
        let labels = MetricLabels::new("simple").with_command(4);
        let label_vec = labels.to_labels();

        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("code", "4".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::COMMANDS_RECEIVED.name, "hexsim.command.received");
        assert_eq!(metric_defs::COMMANDS_RECEIVED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::COMMAND_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::COMMAND_DURATION.unit, Some(Unit::Seconds));
        assert_eq!(metric_defs::CONNECTED.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::CONNECTED.labels, metric_defs::STANDARD_LABELS);
    }

    #[test]
    fn test_all_metrics_unique() {
        assert_eq!(metric_defs::ALL.len(), 10);
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing is a no-op
        describe_metrics();
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }
}
