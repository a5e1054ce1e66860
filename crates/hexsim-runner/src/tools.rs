//! Client-side commands: `hexsim monitor` and `hexsim send`.

use std::io::Write;

use hexsim_controller::{ClientError, ControllerClient, SimpleConfig, SimpleTelemetry, SubstateDisplay};
use hexsim_protocol::{CommandStatus, Frame, COMMAND_PARAM_COUNT};
use tokio::net::ToSocketAddrs;

use crate::error::RunnerError;

/// Client for a controller serving the simple device.
pub type SimpleClient = ControllerClient<SimpleConfig, SimpleTelemetry>;

/// One-line rendering of a frame.
pub fn describe_frame(frame: &Frame<SimpleConfig, SimpleTelemetry>) -> String {
    let time = frame.header().timestamp_secs();
    match frame {
        Frame::CommandStatus(header, status) => {
            format!("{time:.6} status counter={} {}", header.counter, describe_status(status))
        }
        Frame::Config(_, config) => format!(
            "{time:.6} config min_position={} max_position={} max_velocity={} drives_enabled={}",
            config.min_position, config.max_position, config.max_velocity, config.drives_enabled
        ),
        Frame::Telemetry(_, telemetry) => {
            let state = telemetry
                .controller_state()
                .map_or_else(|_| format!("?{}", telemetry.state), |s| s.to_string());
            let substate = telemetry.substate().map_or_else(
                |_| format!("?{}", telemetry.enabled_substate),
                |s| SubstateDisplay(s).to_string(),
            );
            format!(
                "{time:.6} telemetry state={state} substate={substate} application_status={:#x} curr_position={:.4} cmd_position={:.4}",
                telemetry.application_status, telemetry.curr_position, telemetry.cmd_position
            )
        }
    }
}

pub fn describe_status(status: &CommandStatus) -> String {
    if status.is_ack() {
        format!("{} duration={}", status.status, status.duration)
    } else {
        format!("{} reason={:?}", status.status, status.reason)
    }
}

/// Print frames until `count` have been printed or the controller closes the connection.
///
/// Returns the number of frames printed.
pub async fn monitor(
    addr: impl ToSocketAddrs,
    count: Option<usize>,
    out: &mut impl Write,
) -> Result<usize, RunnerError> {
    let mut client = SimpleClient::connect(addr).await?;
    let mut printed = 0;
    while count.map_or(true, |count| printed < count) {
        let frame = match client.next_frame().await {
            Ok(frame) => frame,
            Err(ClientError::Closed) => break,
            Err(e) => return Err(e.into()),
        };
        writeln!(out, "{}", describe_frame(&frame))?;
        printed += 1;
    }
    Ok(printed)
}

/// Send one command and wait for its status.
pub async fn send_command(
    addr: impl ToSocketAddrs,
    code: u32,
    params: [f64; COMMAND_PARAM_COUNT],
) -> Result<CommandStatus, RunnerError> {
    let mut client = SimpleClient::connect(addr).await?;
    let status = client.run_command(code, params).await?;
    client.close().await?;
    Ok(status)
}
