//! Protocol constants
//!
//! Frame identifiers, base command codes and the enumerated parameter values
//! shared by the controller and its client. All values are transmitted
//! little-endian.

// ============================================================================
// Frame IDs (controller → client)
// ============================================================================

/// Acknowledgement of a single command.
pub const FRAME_ID_COMMAND_STATUS: u16 = 1;
/// Periodic telemetry snapshot.
pub const FRAME_ID_TELEMETRY: u16 = 2;
/// Configuration snapshot, sent on connect and whenever it changes.
pub const FRAME_ID_CONFIG: u16 = 3;

// ============================================================================
// Base command codes (client → controller)
// ============================================================================

/// Change the controller state; `param1` is a [`SetStateParam`](crate::SetStateParam).
pub const CMD_SET_STATE: u32 = 1;
/// Change the enabled substate; `param1` selects the device-specific substate command.
pub const CMD_SET_ENABLED_SUBSTATE: u32 = 2;
/// Enable (`param1 != 0`) or disable (`param1 == 0`) the drives.
pub const CMD_ENABLE_DRIVES: u32 = 3;

// ============================================================================
// Command status codes
// ============================================================================

/// The command was accepted.
pub const STATUS_ACK: u32 = 0;
/// The command was rejected.
pub const STATUS_NO_ACK: u32 = 1;

// ============================================================================
// Record sizes
// ============================================================================

/// Size of the reason field of a command status, in bytes.
pub const COMMAND_STATUS_REASON_LEN: usize = 256;

/// Number of floating point parameters carried by a command.
pub const COMMAND_PARAM_COUNT: usize = 6;

// ============================================================================
// Application status bits
// ============================================================================

/// The last commanded move has completed.
pub const APP_STATUS_MOVE_COMPLETE: u32 = 0x0002;
/// The drives are enabled.
pub const APP_STATUS_DRIVES_ENABLED: u32 = 0x0010;
/// Commands are accepted from the external command source (this engine's client).
pub const APP_STATUS_DDS_COMMAND_SOURCE: u32 = 0x0400;
