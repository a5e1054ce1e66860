//! Controller state machine.

use std::fmt;

use hexsim_protocol::{ControllerState, EnabledSubstate};
use tracing::debug;

use crate::error::CommandError;

/// Current state and enabled substate.
///
/// The substate is `Some` exactly when the state is ENABLED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    state: ControllerState,
    enabled_substate: Option<EnabledSubstate>,
}

impl StateMachine {
    pub fn new(initial_state: ControllerState) -> Self {
        StateMachine {
            state: initial_state,
            enabled_substate: default_substate(initial_state),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn enabled_substate(&self) -> Option<EnabledSubstate> {
        self.enabled_substate
    }

    /// Unconditionally change state.
    ///
    /// Entering ENABLED sets the substate to STATIONARY; any other state clears it.
    pub fn set_state(&mut self, state: ControllerState) {
        self.state = state;
        self.enabled_substate = default_substate(state);
        debug!(
            state = %self.state,
            enabled_substate = %SubstateDisplay(self.enabled_substate),
            "set_state"
        );
    }

    /// Change the enabled substate. Only valid while ENABLED.
    pub fn set_enabled_substate(&mut self, substate: EnabledSubstate) -> Result<(), CommandError> {
        self.assert_state(ControllerState::Enabled, None)?;
        if self.enabled_substate != Some(substate) {
            debug!(from = %SubstateDisplay(self.enabled_substate), to = %substate, "set_enabled_substate");
        }
        self.enabled_substate = Some(substate);
        Ok(())
    }

    /// Fail with [`CommandError::Rejected`] unless the state (and substate, if given) match.
    pub fn assert_state(
        &self,
        state: ControllerState,
        enabled_substate: Option<EnabledSubstate>,
    ) -> Result<(), CommandError> {
        if self.state != state {
            return Err(CommandError::rejected(format!(
                "state={}; must be {} for this command.",
                self.state, state
            )));
        }
        if let Some(expected) = enabled_substate {
            if self.enabled_substate != Some(expected) {
                return Err(CommandError::rejected(format!(
                    "enabled_substate={}; must be {} for this command.",
                    SubstateDisplay(self.enabled_substate),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Fail unless the state is one of `states`.
    pub fn assert_state_in(&self, states: &[ControllerState]) -> Result<(), CommandError> {
        if states.contains(&self.state) {
            return Ok(());
        }
        let names: Vec<String> = states.iter().map(ToString::to_string).collect();
        Err(CommandError::rejected(format!(
            "state={}; must be {} for this command.",
            self.state,
            names.join(" or ")
        )))
    }

    /// Fail unless ENABLED and STATIONARY.
    pub fn assert_stationary(&self) -> Result<(), CommandError> {
        self.assert_state(ControllerState::Enabled, Some(EnabledSubstate::Stationary))
    }
}

fn default_substate(state: ControllerState) -> Option<EnabledSubstate> {
    match state {
        ControllerState::Enabled => Some(EnabledSubstate::Stationary),
        _ => None,
    }
}

/// Formats an optional substate, with `NONE` for the absent substate.
pub struct SubstateDisplay(pub Option<EnabledSubstate>);

impl fmt::Display for SubstateDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(substate) => write!(f, "{substate}"),
            None => f.write_str("NONE"),
        }
    }
}
