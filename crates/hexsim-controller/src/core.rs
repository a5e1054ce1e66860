//! State owned by the engine across connections.

use bytes::Bytes;
use hexsim_protocol::{
    encode_frame, ApplicationStatus, Command, CommandStatus, ControllerState, FrameId, HeaderTable,
};

use crate::device::{Device, DeviceConfig, DeviceTelemetry};
use crate::state::StateMachine;

/// The state machine, config, telemetry and device of one controller.
///
/// Command handlers receive `&mut ControllerCore`; the publisher borrows it
/// once per tick. Frames are fully encoded while the core is borrowed, so a
/// frame never mixes values from before and after a mutation.
pub struct ControllerCore<D: Device> {
    state: StateMachine,
    config: D::Config,
    telemetry: D::Telemetry,
    device: D,
    headers: HeaderTable,
    config_publish_requested: bool,
    command_authority: bool,
}

impl<D: Device> ControllerCore<D> {
    pub fn new(
        device: D,
        config: D::Config,
        telemetry: D::Telemetry,
        initial_state: ControllerState,
    ) -> Self {
        ControllerCore {
            state: StateMachine::new(initial_state),
            config,
            telemetry,
            device,
            headers: HeaderTable::new(),
            config_publish_requested: false,
            command_authority: true,
        }
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateMachine {
        &mut self.state
    }

    pub fn config(&self) -> &D::Config {
        &self.config
    }

    /// Mutable config. Call [`request_config_publish`](Self::request_config_publish)
    /// after changing it from a command handler.
    pub fn config_mut(&mut self) -> &mut D::Config {
        &mut self.config
    }

    pub fn telemetry(&self) -> &D::Telemetry {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut D::Telemetry {
        &mut self.telemetry
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Set drives enabled and schedule an immediate config publication.
    pub fn set_drives_enabled(&mut self, enabled: bool) {
        self.config.set_drives_enabled(enabled);
        self.request_config_publish();
    }

    /// Ask the command path to write a config frame before the pending command status.
    pub fn request_config_publish(&mut self) {
        self.config_publish_requested = true;
    }

    /// Clear and return the pending config publication request.
    pub fn take_config_publish_request(&mut self) -> bool {
        std::mem::take(&mut self.config_publish_requested)
    }

    /// Whether this engine holds commanding authority (reported in telemetry).
    pub fn command_authority(&self) -> bool {
        self.command_authority
    }

    pub fn set_command_authority(&mut self, authority: bool) {
        self.command_authority = authority;
    }

    /// Run the device's post-command hook.
    pub(crate) fn end_run_command(&mut self, command: &Command) {
        self.device.end_run_command(command, &mut self.telemetry);
    }

    /// Encode the current config with a fresh header.
    pub fn config_frame(&mut self) -> Bytes {
        let (header, _) = self.headers.refresh(FrameId::Config);
        encode_frame(header, &self.config)
    }

    /// Run the device's telemetry hook and encode the result with a fresh header.
    pub fn telemetry_frame(&mut self) -> Bytes {
        let (header, now) = self.headers.refresh(FrameId::Telemetry);
        self.device
            .update_telemetry(&mut self.telemetry, &self.config, &mut self.state, now);
        self.telemetry
            .set_controller_state(self.state.state(), self.state.enabled_substate());
        let status = self
            .telemetry
            .application_status()
            .with(ApplicationStatus::DDS_COMMAND_SOURCE, self.command_authority);
        self.telemetry.set_application_status(status);
        encode_frame(header, &self.telemetry)
    }

    /// Encode a command status whose header echoes `counter`.
    pub fn command_status_frame(&mut self, counter: u32, status: &CommandStatus) -> Bytes {
        let (header, _) = self.headers.refresh(FrameId::CommandStatus);
        header.counter = counter;
        encode_frame(header, status)
    }
}
