//! Error types for the controller.

use std::io;

use hexsim_protocol::ProtocolError;
use thiserror::Error;

use crate::dispatch::DispatchKey;

/// Why a command was not acknowledged.
///
/// Every variant becomes a NO_ACK whose reason is the `Display` text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// A precondition failed (wrong state or substate) or an argument is out of range.
    #[error("{0}")]
    Rejected(String),

    /// No handler is registered for the command's dispatch key.
    #[error("Unrecognized command code {code}; param1={param1}")]
    Unrecognized { code: u32, param1: f64 },

    /// The handler failed unexpectedly.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        CommandError::Rejected(reason.into())
    }
}

/// Errors building the dispatch table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("a handler named {existing:?} is already registered for {key}")]
    Duplicate {
        key: DispatchKey,
        existing: &'static str,
    },
}

/// Errors starting the controller. These are the only fatal errors.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid command table: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Why the telemetry loop stopped before the client disconnected.
#[derive(Error, Debug)]
pub enum PublisherError {
    /// A write failed; the session is going away.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] io::Error),

    /// The device failed while computing telemetry.
    #[error("device failed to update telemetry: {0}")]
    Device(String),
}

/// Errors from [`ControllerClient`](crate::ControllerClient).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection closed by controller")]
    Closed,
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
