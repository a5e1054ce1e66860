//! Built-in command handlers, registered for every device.

use hexsim_protocol::{Command, ControllerState};

use crate::core::ControllerCore;
use crate::device::Device;
use crate::error::CommandError;

/// SET_STATE/ENABLE: STANDBY → ENABLED.
pub fn do_enable<D: Device>(
    core: &mut ControllerCore<D>,
    _command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state().assert_state(ControllerState::Standby, None)?;
    core.state_mut().set_state(ControllerState::Enabled);
    Ok(None)
}

/// SET_STATE/STANDBY: ENABLED → STANDBY.
pub fn do_standby<D: Device>(
    core: &mut ControllerCore<D>,
    _command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state().assert_state(ControllerState::Enabled, None)?;
    core.state_mut().set_state(ControllerState::Standby);
    Ok(None)
}

/// SET_STATE/CLEAR_ERROR: FAULT or STANDBY → STANDBY.
///
/// Clears the error if there is one and it can be cleared, so it succeeds
/// without effect in STANDBY.
pub fn do_clear_error<D: Device>(
    core: &mut ControllerCore<D>,
    _command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.state()
        .assert_state_in(&[ControllerState::Fault, ControllerState::Standby])?;
    core.state_mut().set_state(ControllerState::Standby);
    Ok(None)
}

/// ENABLE_DRIVES: `param1 != 0` enables the drives. Config is republished at once.
pub fn do_enable_drives<D: Device>(
    core: &mut ControllerCore<D>,
    command: &Command,
) -> Result<Option<f64>, CommandError> {
    core.set_drives_enabled(command.param1() != 0.0);
    Ok(None)
}
