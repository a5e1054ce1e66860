//! Telemetry/config publication loop.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use hexsim_metrics::{metric_defs, MetricLabels};
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{error, info};

use crate::core::ControllerCore;
use crate::device::Device;
use crate::error::{panic_message, PublisherError};

/// Default interval between telemetry frames.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Write one complete frame.
///
/// Both the command path and the publisher write through the same lock, one
/// `write_all` per frame, so frames never interleave on the wire.
pub(crate) async fn write_frame<W>(writer: &AsyncMutex<W>, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer.lock().await;
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Write config once, then telemetry every `interval` while `connected` is true.
///
/// Returns `Ok(())` when `connected` turns false or its sender is dropped.
/// Cancellation (dropping or aborting the future) is a normal exit and is not
/// reported.
pub async fn telemetry_loop<D, W>(
    core: Arc<Mutex<ControllerCore<D>>>,
    writer: Arc<AsyncMutex<W>>,
    interval: Duration,
    mut connected: watch::Receiver<bool>,
    labels: MetricLabels,
) -> Result<(), PublisherError>
where
    D: Device,
    W: AsyncWrite + Unpin + Send,
{
    let labels = labels.to_labels();

    if *connected.borrow() {
        let frame = core.lock().config_frame();
        write_frame(&writer, &frame)
            .await
            .map_err(PublisherError::ConnectionLost)?;
        metrics::counter!(metric_defs::CONFIG_PUBLISHED.name, &labels).increment(1);
    }

    while *connected.borrow() {
        let frame = panic::catch_unwind(AssertUnwindSafe(|| core.lock().telemetry_frame()))
            .map_err(|payload| PublisherError::Device(panic_message(payload.as_ref())))?;
        write_frame(&writer, &frame)
            .await
            .map_err(PublisherError::ConnectionLost)?;
        metrics::counter!(metric_defs::TELEMETRY_PUBLISHED.name, &labels).increment(1);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Run [`telemetry_loop`] for one session, logging how it ended.
pub(crate) async fn run_publisher<D, W>(
    core: Arc<Mutex<ControllerCore<D>>>,
    writer: Arc<AsyncMutex<W>>,
    interval: Duration,
    connected: watch::Receiver<bool>,
    labels: MetricLabels,
) where
    D: Device,
    W: AsyncWrite + Unpin + Send,
{
    info!("telemetry loop begins");
    match telemetry_loop(core, writer, interval, connected, labels).await {
        Ok(()) => info!("telemetry loop ends: client disconnected"),
        Err(PublisherError::ConnectionLost(e)) => {
            info!(error = %e, "telemetry loop ends: connection lost")
        }
        Err(e) => error!(error = %e, "telemetry loop failed"),
    }
}
