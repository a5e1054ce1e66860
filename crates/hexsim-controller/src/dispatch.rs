//! Command dispatch.
//!
//! A command is looked up by its [`DispatchKey`]: the opcode, plus
//! `trunc(param1)` for the opcodes whose first parameter selects a
//! sub-command (SET_STATE and SET_ENABLED_SUBSTATE). The table is built once
//! at start-up: built-in handlers first, then the device's.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use hexsim_metrics::{metric_defs, MetricLabels};
use hexsim_protocol::{Command, CommandStatus, SetStateParam};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::core::ControllerCore;
use crate::device::{BaseCommandCodes, Device};
use crate::error::{panic_message, CommandError, DispatchError};

/// Normalized lookup key of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub code: u32,
    /// `trunc(param1)` for opcodes with a sub-selector.
    pub sub: Option<i32>,
}

impl DispatchKey {
    pub const fn code(code: u32) -> Self {
        DispatchKey { code, sub: None }
    }

    pub const fn with_sub(code: u32, sub: i32) -> Self {
        DispatchKey {
            code,
            sub: Some(sub),
        }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "code {} with param1={}", self.code, sub),
            None => write!(f, "code {}", self.code),
        }
    }
}

/// A command handler.
///
/// Returns the estimated seconds until the command's effect is complete, or
/// `None` if it is already complete.
pub type HandlerFn<D> = fn(&mut ControllerCore<D>, &Command) -> Result<Option<f64>, CommandError>;

/// Where a handler came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Builtin,
    Device,
}

pub struct Handler<D: Device> {
    pub name: &'static str,
    pub kind: HandlerKind,
    pub run: HandlerFn<D>,
}

impl<D: Device> Clone for Handler<D> {
    fn clone(&self) -> Self {
        Handler {
            name: self.name,
            kind: self.kind,
            run: self.run,
        }
    }
}

impl<D: Device> fmt::Debug for Handler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Mapping from dispatch key to handler.
pub struct CommandTable<D: Device> {
    codes: BaseCommandCodes,
    handlers: HashMap<DispatchKey, Handler<D>>,
}

impl<D: Device> CommandTable<D> {
    /// An empty table.
    pub fn new(codes: BaseCommandCodes) -> Self {
        CommandTable {
            codes,
            handlers: HashMap::new(),
        }
    }

    /// A table holding the built-in state transition and drive commands.
    pub fn with_builtins(codes: BaseCommandCodes) -> Result<Self, DispatchError> {
        let mut table = Self::new(codes);
        let set_state = |param: SetStateParam| DispatchKey::with_sub(codes.set_state, param as i32);
        table.insert(set_state(SetStateParam::Enable), "enable", HandlerKind::Builtin, commands::do_enable)?;
        table.insert(set_state(SetStateParam::Standby), "standby", HandlerKind::Builtin, commands::do_standby)?;
        table.insert(
            set_state(SetStateParam::ClearError),
            "clear_error",
            HandlerKind::Builtin,
            commands::do_clear_error,
        )?;
        table.insert(
            DispatchKey::code(codes.enable_drives),
            "enable_drives",
            HandlerKind::Builtin,
            commands::do_enable_drives,
        )?;
        Ok(table)
    }

    pub fn codes(&self) -> &BaseCommandCodes {
        &self.codes
    }

    /// Dispatch key of a command.
    pub fn key_for(&self, command: &Command) -> DispatchKey {
        if self.codes.has_sub_selector(command.code) {
            // `as` saturates and maps NaN to 0 (INVALID)
            DispatchKey::with_sub(command.code, command.param1().trunc() as i32)
        } else {
            DispatchKey::code(command.code)
        }
    }

    /// Register a device handler. Fails if `key` is already bound.
    pub fn register(
        &mut self,
        key: DispatchKey,
        name: &'static str,
        run: HandlerFn<D>,
    ) -> Result<(), DispatchError> {
        self.insert(key, name, HandlerKind::Device, run)
    }

    /// Bind `key` to a device handler, returning any handler it replaces.
    pub fn replace(
        &mut self,
        key: DispatchKey,
        name: &'static str,
        run: HandlerFn<D>,
    ) -> Option<Handler<D>> {
        let previous = self.handlers.insert(
            key,
            Handler {
                name,
                kind: HandlerKind::Device,
                run,
            },
        );
        if let Some(previous) = &previous {
            info!(%key, replaced = previous.name, with = name, "replaced command handler");
        }
        previous
    }

    fn insert(
        &mut self,
        key: DispatchKey,
        name: &'static str,
        kind: HandlerKind,
        run: HandlerFn<D>,
    ) -> Result<(), DispatchError> {
        if let Some(existing) = self.handlers.get(&key) {
            return Err(DispatchError::Duplicate {
                key,
                existing: existing.name,
            });
        }
        self.handlers.insert(key, Handler { name, kind, run });
        Ok(())
    }

    pub fn get(&self, key: &DispatchKey) -> Option<&Handler<D>> {
        self.handlers.get(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runs commands against a [`ControllerCore`] and turns outcomes into [`CommandStatus`] records.
pub struct Dispatcher<D: Device> {
    table: CommandTable<D>,
    labels: MetricLabels,
}

impl<D: Device> Dispatcher<D> {
    /// Build the table for `D`: built-in handlers, then the device's.
    pub fn new() -> Result<Self, DispatchError> {
        let mut table = CommandTable::with_builtins(D::COMMAND_CODES)?;
        D::register_commands(&mut table)?;
        debug!(device = D::NAME, handlers = table.len(), "command table built");
        Ok(Self::from_table(table))
    }

    pub fn from_table(table: CommandTable<D>) -> Self {
        Dispatcher {
            table,
            labels: MetricLabels::new(D::NAME),
        }
    }

    pub fn table(&self) -> &CommandTable<D> {
        &self.table
    }

    /// Run one command: look up its handler, run it, then the device's post-command hook.
    ///
    /// Returns the estimated duration in seconds, 0 if already complete.
    pub fn run_command(
        &self,
        core: &mut ControllerCore<D>,
        command: &Command,
    ) -> Result<f64, CommandError> {
        debug!(
            counter = command.counter,
            code = command.code,
            params = ?command.params,
            "run_command"
        );
        let key = self.table.key_for(command);
        let handler = self
            .table
            .get(&key)
            .ok_or(CommandError::Unrecognized {
                code: command.code,
                param1: command.param1(),
            })?;

        let duration = (handler.run)(core, command)?;
        core.end_run_command(command);
        Ok(duration.unwrap_or(0.0))
    }

    /// Run one command and produce its status.
    ///
    /// Never fails: rejections, unrecognized commands and handler panics all
    /// become NO_ACK.
    pub fn handle(&self, core: &mut ControllerCore<D>, command: &Command) -> CommandStatus {
        let labels = self.labels.with_command(command.code).to_labels();
        metrics::counter!(metric_defs::COMMANDS_RECEIVED.name, &labels).increment(1);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_command(core, command)))
            .unwrap_or_else(|payload| Err(CommandError::Failed(panic_message(payload.as_ref()))));

        match outcome {
            Ok(duration) => {
                let duration = if duration.is_finite() && duration >= 0.0 {
                    duration
                } else {
                    warn!(counter = command.counter, code = command.code, duration, "handler returned an invalid duration; reporting 0");
                    0.0
                };
                metrics::counter!(metric_defs::COMMANDS_ACKED.name, &labels).increment(1);
                metrics::histogram!(metric_defs::COMMAND_DURATION.name, &labels).record(duration);
                CommandStatus::ack(duration)
            }
            Err(e @ CommandError::Failed(_)) => {
                error!(counter = command.counter, code = command.code, error = %e, "command failed (without rejecting)");
                metrics::counter!(metric_defs::COMMAND_FAILURES.name, &labels).increment(1);
                metrics::counter!(metric_defs::COMMANDS_REJECTED.name, &labels).increment(1);
                CommandStatus::no_ack(e.to_string())
            }
            Err(e) => {
                info!(counter = command.counter, code = command.code, reason = %e, "command rejected");
                metrics::counter!(metric_defs::COMMANDS_REJECTED.name, &labels).increment(1);
                CommandStatus::no_ack(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{SimpleDevice, SimpleSettings, CMD_CONFIG_VELOCITY, CMD_MOVE};
    use hexsim_protocol::{
        CommandStatusCode, ControllerState, EnabledSubstate, CMD_ENABLE_DRIVES,
        CMD_SET_ENABLED_SUBSTATE, CMD_SET_STATE,
    };

    fn core(initial_state: ControllerState) -> ControllerCore<SimpleDevice> {
        SimpleDevice::core(&SimpleSettings::default(), initial_state)
    }

    fn set_state(param: SetStateParam, counter: u32) -> Command {
        Command::new(CMD_SET_STATE, counter).with_param1(param.as_param())
    }

    #[test]
    fn test_key_for() {
        let table = CommandTable::<SimpleDevice>::new(BaseCommandCodes::STANDARD);
        assert_eq!(
            table.key_for(&Command::new(CMD_SET_STATE, 0).with_param1(2.7)),
            DispatchKey::with_sub(CMD_SET_STATE, 2)
        );
        assert_eq!(
            table.key_for(&Command::new(CMD_SET_ENABLED_SUBSTATE, 0).with_param1(3.0)),
            DispatchKey::with_sub(CMD_SET_ENABLED_SUBSTATE, 3)
        );
        assert_eq!(
            table.key_for(&Command::new(CMD_ENABLE_DRIVES, 0).with_param1(1.0)),
            DispatchKey::code(CMD_ENABLE_DRIVES)
        );
        assert_eq!(
            table.key_for(&Command::new(CMD_SET_STATE, 0).with_param1(f64::NAN)),
            DispatchKey::with_sub(CMD_SET_STATE, 0)
        );
    }

    #[test]
    fn test_builtins_registered_first() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let table = dispatcher.table();
        let enable = table
            .get(&DispatchKey::with_sub(CMD_SET_STATE, SetStateParam::Enable as i32))
            .unwrap();
        assert_eq!(enable.kind, HandlerKind::Builtin);
        assert_eq!(enable.name, "enable");
        assert_eq!(
            table.get(&DispatchKey::code(CMD_MOVE)).unwrap().kind,
            HandlerKind::Device
        );
    }

    #[test]
    fn test_register_duplicate() {
        let mut table = CommandTable::<SimpleDevice>::with_builtins(BaseCommandCodes::STANDARD).unwrap();
        let key = DispatchKey::code(CMD_ENABLE_DRIVES);
        let err = table
            .register(key, "my_drives", commands::do_enable_drives)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Duplicate {
                key,
                existing: "enable_drives"
            }
        );

        // Explicit override is allowed
        let previous = table.replace(key, "my_drives", commands::do_enable_drives);
        assert_eq!(previous.map(|h| h.name), Some("enable_drives"));
        assert_eq!(table.get(&key).unwrap().kind, HandlerKind::Device);
    }

    #[test]
    fn test_enable_and_standby() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let mut core = core(ControllerState::Standby);

        let status = dispatcher.handle(&mut core, &set_state(SetStateParam::Enable, 1));
        assert_eq!(status, CommandStatus::ack(0.0));
        assert_eq!(core.state().state(), ControllerState::Enabled);
        assert_eq!(core.state().enabled_substate(), Some(EnabledSubstate::Stationary));

        // Enabling twice is a precondition failure
        let status = dispatcher.handle(&mut core, &set_state(SetStateParam::Enable, 2));
        assert_eq!(status.status, CommandStatusCode::NoAck);
        assert!(status.reason.contains("must be STANDBY"));
        assert_eq!(core.state().state(), ControllerState::Enabled);

        let status = dispatcher.handle(&mut core, &set_state(SetStateParam::Standby, 3));
        assert!(status.is_ack());
        assert_eq!(core.state().state(), ControllerState::Standby);
        assert_eq!(core.state().enabled_substate(), None);
    }

    #[test]
    fn test_clear_error() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let clear = set_state(SetStateParam::ClearError, 1);

        // From STANDBY: no-op success
        let mut standby = core(ControllerState::Standby);
        assert!(dispatcher.handle(&mut standby, &clear).is_ack());
        assert_eq!(standby.state().state(), ControllerState::Standby);

        // From FAULT: back to STANDBY
        let mut fault = core(ControllerState::Fault);
        assert!(dispatcher.handle(&mut fault, &clear).is_ack());
        assert_eq!(fault.state().state(), ControllerState::Standby);

        // From ENABLED: rejected
        let mut enabled = core(ControllerState::Enabled);
        let status = dispatcher.handle(&mut enabled, &clear);
        assert!(!status.is_ack());
        assert_eq!(status.reason, "state=ENABLED; must be FAULT or STANDBY for this command.");
        assert_eq!(enabled.state().state(), ControllerState::Enabled);
    }

    #[test]
    fn test_unrecognized_command() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let mut core = core(ControllerState::Standby);

        for command in [
            Command::new(99, 7),
            set_state(SetStateParam::Exit, 8),
            Command::new(CMD_SET_ENABLED_SUBSTATE, 9).with_param1(42.0),
        ] {
            let status = dispatcher.handle(&mut core, &command);
            assert_eq!(status.status, CommandStatusCode::NoAck);
            assert!(
                status.reason.contains(&command.code.to_string()),
                "reason {:?} should name code {}",
                status.reason,
                command.code
            );
            assert_eq!(core.state().state(), ControllerState::Standby);
        }
        assert_eq!(
            dispatcher.run_command(&mut core, &Command::new(99, 7)),
            Err(CommandError::Unrecognized { code: 99, param1: 0.0 })
        );
    }

    #[test]
    fn test_enable_drives_requests_config() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let mut core = core(ControllerState::Standby);
        assert!(!core.take_config_publish_request());

        let status = dispatcher.handle(&mut core, &Command::new(CMD_ENABLE_DRIVES, 1).with_param1(1.0));
        assert!(status.is_ack());
        assert!(core.config().drives_enabled);
        assert!(core.take_config_publish_request());
        assert!(!core.take_config_publish_request());

        dispatcher.handle(&mut core, &Command::new(CMD_ENABLE_DRIVES, 2).with_param1(0.0));
        assert!(!core.config().drives_enabled);
    }

    #[test]
    fn test_end_run_command_only_after_success() {
        let dispatcher = Dispatcher::<SimpleDevice>::new().unwrap();
        let mut core = core(ControllerState::Standby);

        // Rejected: MOVE requires ENABLED
        dispatcher.handle(&mut core, &Command::new(CMD_MOVE, 1).with_param1(1.0));
        assert_eq!(core.device().last_command(), None);

        dispatcher.handle(&mut core, &set_state(SetStateParam::Enable, 2));
        assert_eq!(core.device().last_command(), Some(CMD_SET_STATE));

        dispatcher.handle(&mut core, &Command::new(CMD_CONFIG_VELOCITY, 3).with_param1(10.0));
        assert_eq!(core.device().last_command(), Some(CMD_CONFIG_VELOCITY));
    }

    #[test]
    fn test_handler_panic_becomes_no_ack() {
        let mut table = CommandTable::<SimpleDevice>::with_builtins(BaseCommandCodes::STANDARD).unwrap();
        table
            .register(DispatchKey::code(50), "boom", |_, _| panic!("boom"))
            .unwrap();
        let dispatcher = Dispatcher::from_table(table);
        let mut core = core(ControllerState::Standby);

        let status = dispatcher.handle(&mut core, &Command::new(50, 1));
        assert_eq!(status.status, CommandStatusCode::NoAck);
        assert!(status.reason.contains("boom"));

        // The dispatcher keeps working
        assert!(dispatcher
            .handle(&mut core, &set_state(SetStateParam::Enable, 2))
            .is_ack());
    }

    #[test]
    fn test_invalid_duration_reported_as_zero() {
        let mut table = CommandTable::<SimpleDevice>::with_builtins(BaseCommandCodes::STANDARD).unwrap();
        table
            .register(DispatchKey::code(60), "nan", |_, _| Ok(Some(f64::NAN)))
            .unwrap();
        table
            .register(DispatchKey::code(61), "negative", |_, _| Ok(Some(-1.0)))
            .unwrap();
        table
            .register(DispatchKey::code(62), "slow", |_, _| Ok(Some(2.5)))
            .unwrap();
        let dispatcher = Dispatcher::from_table(table);
        let mut core = core(ControllerState::Standby);

        assert_eq!(dispatcher.handle(&mut core, &Command::new(60, 1)), CommandStatus::ack(0.0));
        assert_eq!(dispatcher.handle(&mut core, &Command::new(61, 2)), CommandStatus::ack(0.0));
        assert_eq!(dispatcher.handle(&mut core, &Command::new(62, 3)), CommandStatus::ack(2.5));
    }
}
