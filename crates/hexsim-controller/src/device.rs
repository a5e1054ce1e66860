//! Device extension point.
//!
//! The engine knows nothing about a particular device beyond the traits in
//! this module. A device supplies its config and telemetry layouts, any extra
//! commands, the telemetry update hook and the post-command hook.

use chrono::{DateTime, Utc};
use hexsim_protocol::{
    ApplicationStatus, Command, ControllerState, EnabledSubstate, WireRecord, CMD_ENABLE_DRIVES,
    CMD_SET_ENABLED_SUBSTATE, CMD_SET_STATE,
};

use crate::dispatch::CommandTable;
use crate::error::DispatchError;
use crate::state::StateMachine;

/// Config record of a device.
pub trait DeviceConfig: WireRecord + Clone + Send + 'static {
    fn drives_enabled(&self) -> bool;
    fn set_drives_enabled(&mut self, enabled: bool);
}

/// Telemetry record of a device.
pub trait DeviceTelemetry: WireRecord + Clone + Send + 'static {
    /// Mirror the state machine into the record.
    fn set_controller_state(&mut self, state: ControllerState, substate: Option<EnabledSubstate>);

    fn application_status(&self) -> ApplicationStatus;

    fn set_application_status(&mut self, status: ApplicationStatus);
}

/// Opcodes of the built-in commands.
///
/// Devices whose firmware numbers these differently override
/// [`Device::COMMAND_CODES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCommandCodes {
    pub set_state: u32,
    pub set_enabled_substate: u32,
    pub enable_drives: u32,
}

impl BaseCommandCodes {
    pub const STANDARD: BaseCommandCodes = BaseCommandCodes {
        set_state: CMD_SET_STATE,
        set_enabled_substate: CMD_SET_ENABLED_SUBSTATE,
        enable_drives: CMD_ENABLE_DRIVES,
    };

    /// Whether `param1` of this opcode is part of the dispatch key.
    pub fn has_sub_selector(&self, code: u32) -> bool {
        code == self.set_state || code == self.set_enabled_substate
    }
}

impl Default for BaseCommandCodes {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// A simulated device driven by the engine.
pub trait Device: Send + Sized + 'static {
    type Config: DeviceConfig;
    type Telemetry: DeviceTelemetry;

    /// Short name used in logs and metric labels.
    const NAME: &'static str;

    const COMMAND_CODES: BaseCommandCodes = BaseCommandCodes::STANDARD;

    /// Register device-specific commands. Called once, after the built-in commands.
    fn register_commands(table: &mut CommandTable<Self>) -> Result<(), DispatchError> {
        let _ = table;
        Ok(())
    }

    /// Compute telemetry for the instant `now`.
    ///
    /// Called once per publication tick, before the state is mirrored into
    /// `telemetry`. The device may change the enabled substate (e.g. when a
    /// move completes) but should not call `set_state` except to inject a fault.
    fn update_telemetry(
        &mut self,
        telemetry: &mut Self::Telemetry,
        config: &Self::Config,
        state: &mut StateMachine,
        now: DateTime<Utc>,
    );

    /// Called after every command whose handler succeeded.
    fn end_run_command(&mut self, command: &Command, telemetry: &mut Self::Telemetry);
}
