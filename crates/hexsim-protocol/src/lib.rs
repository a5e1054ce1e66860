//! Low-level controller wire protocol
//!
//! This crate provides the fixed binary layouts spoken between a mock
//! hexapod/rotator low-level controller and its single client, and the
//! helpers to frame them.
//!
//! # Protocol Overview
//!
//! A controller and its client share one stream connection:
//!
//! - **Commands** (client → controller): bare 56-byte [`Command`] records
//! - **Command status** (controller → client): one [`CommandStatus`] per command,
//!   whose header echoes the command's counter
//! - **Config / Telemetry** (controller → client): device-defined records, config
//!   on connect and whenever it changes, telemetry at a fixed cadence
//!
//! Every controller → client record is prefixed with a [`Header`] whose
//! `frame_id` identifies the record kind.
//!
//! # Example
//!
//! ```rust,ignore
//! use hexsim_protocol::{encode_frame, CommandStatus, FrameId, HeaderTable};
//!
//! let mut headers = HeaderTable::new();
//! let (header, _now) = headers.refresh(FrameId::CommandStatus);
//! header.counter = command.counter;
//! let frame = encode_frame(header, &CommandStatus::ack(0.0));
//! ```

mod constants;
mod error;
mod frame;
mod header;
mod records;
mod types;

pub use constants::*;
pub use error::*;
pub use frame::*;
pub use header::*;
pub use records::*;
pub use types::*;
