//! `hexsim serve`: run a controller until shut down.

use std::future::Future;

use hexsim_controller::{MockController, SimpleDevice};
use tokio::sync::watch;
use tracing::info;

use crate::config::{MetricsSection, RunnerConfig};
use crate::error::RunnerError;

/// Start a controller for the simple device as configured.
pub async fn start_controller(
    config: &RunnerConfig,
) -> Result<MockController<SimpleDevice>, RunnerError> {
    let (device, device_config, telemetry) = SimpleDevice::parts(&config.device);
    let controller =
        MockController::start(device, device_config, telemetry, config.server_config()).await?;
    Ok(controller)
}

/// Serve until `shutdown` resolves, then close the controller.
pub async fn serve(
    config: RunnerConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), RunnerError> {
    hexsim_metrics::describe_metrics();
    install_metrics_exporter(&config.metrics)?;

    let controller = start_controller(&config).await?;
    info!(addr = %controller.local_addr(), "serving; press Ctrl-C to stop");

    shutdown.await;
    info!("shutdown requested");
    controller.close().await;
    Ok(())
}

#[cfg(feature = "prometheus")]
fn install_metrics_exporter(section: &MetricsSection) -> Result<(), RunnerError> {
    if let Some(addr) = section.prometheus_addr {
        hexsim_metrics::install_prometheus_exporter(addr)
            .map_err(|e| RunnerError::Metrics(e.to_string()))?;
        info!(%addr, "prometheus exporter listening");
    }
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics_exporter(section: &MetricsSection) -> Result<(), RunnerError> {
    if let Some(addr) = section.prometheus_addr {
        tracing::warn!(%addr, "prometheus_addr ignored: built without the prometheus feature");
    }
    Ok(())
}

/// A future that resolves on the first Ctrl-C.
///
/// Installs the process-wide handler; call at most once.
pub fn ctrl_c() -> Result<impl Future<Output = ()>, RunnerError> {
    let (tx, mut rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        tx.send_replace(true);
    })?;
    Ok(async move {
        let _ = rx.wait_for(|stop| *stop).await;
    })
}
