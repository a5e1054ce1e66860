//! # hexsim-controller
//!
//! Engine of a mock low-level motion controller.
//!
//! A [`MockController`] listens on one TCP socket and serves one client at a
//! time. Commands arriving on the connection are dispatched to handlers that
//! drive a [`StateMachine`] and a [`Device`]; each command gets exactly one
//! command status frame back, in order. Alongside, a publisher writes the
//! device config when the client connects (and whenever a command changes
//! it) and telemetry at a fixed interval.
//!
//! ## Adding a device
//!
//! Implement [`Device`] with its config and telemetry records, register any
//! extra commands in [`Device::register_commands`], and start a
//! [`MockController`] with it. [`SimpleDevice`] is a small single-axis
//! example.

mod client;
mod commands;
mod core;
mod device;
mod dispatch;
mod error;
mod publisher;
mod server;
mod simple;
mod state;

pub use client::ControllerClient;
pub use commands::{do_clear_error, do_enable, do_enable_drives, do_standby};
pub use core::ControllerCore;
pub use device::{BaseCommandCodes, Device, DeviceConfig, DeviceTelemetry};
pub use dispatch::{CommandTable, DispatchKey, Dispatcher, Handler, HandlerFn, HandlerKind};
pub use error::{ClientError, CommandError, DispatchError, PublisherError, ServerError};
pub use publisher::{telemetry_loop, DEFAULT_TELEMETRY_INTERVAL};
pub use server::{MockController, ServerConfig};
pub use simple::{
    SimpleConfig, SimpleDevice, SimpleSettings, SimpleTelemetry, CMD_CONFIG_VELOCITY, CMD_MOVE,
    SUBSTATE_STOP,
};
pub use state::{StateMachine, SubstateDisplay};
