//! Enumerated values carried inside records.

use crate::constants::*;
use crate::error::ProtocolError;

/// Kind of frame written by the controller; the first field of every [`Header`](crate::Header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameId {
    /// Command acknowledgement.
    CommandStatus,
    /// Periodic telemetry.
    Telemetry,
    /// Configuration snapshot.
    Config,
}

impl FrameId {
    /// Number of frame kinds.
    pub const COUNT: usize = 3;

    /// All frame kinds, in the order used to index per-kind tables.
    pub const ALL: [FrameId; Self::COUNT] = [FrameId::CommandStatus, FrameId::Telemetry, FrameId::Config];

    /// Position of this kind in [`FrameId::ALL`].
    pub const fn index(self) -> usize {
        match self {
            FrameId::CommandStatus => 0,
            FrameId::Telemetry => 1,
            FrameId::Config => 2,
        }
    }
}

impl From<FrameId> for u16 {
    fn from(id: FrameId) -> Self {
        match id {
            FrameId::CommandStatus => FRAME_ID_COMMAND_STATUS,
            FrameId::Telemetry => FRAME_ID_TELEMETRY,
            FrameId::Config => FRAME_ID_CONFIG,
        }
    }
}

impl TryFrom<u16> for FrameId {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            FRAME_ID_COMMAND_STATUS => Ok(FrameId::CommandStatus),
            FRAME_ID_TELEMETRY => Ok(FrameId::Telemetry),
            FRAME_ID_CONFIG => Ok(FrameId::Config),
            other => Err(ProtocolError::UnknownFrameId(other)),
        }
    }
}

/// Primary controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Powered but not accepting motion commands.
    Standby,
    /// Legacy state of older controllers; not reachable by built-in commands.
    Disabled,
    /// Accepting motion commands.
    Enabled,
    /// Legacy state of older controllers; not reachable by built-in commands.
    Offline,
    /// An error occurred; must be cleared before enabling.
    Fault,
}

impl ControllerState {
    /// Value transmitted in telemetry.
    pub const fn wire_value(self) -> u32 {
        match self {
            ControllerState::Standby => 0,
            ControllerState::Disabled => 1,
            ControllerState::Enabled => 2,
            ControllerState::Offline => 3,
            ControllerState::Fault => 4,
        }
    }
}

impl TryFrom<u32> for ControllerState {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ControllerState::Standby),
            1 => Ok(ControllerState::Disabled),
            2 => Ok(ControllerState::Enabled),
            3 => Ok(ControllerState::Offline),
            4 => Ok(ControllerState::Fault),
            value => Err(ProtocolError::InvalidEnum { field: "state", value }),
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControllerState::Standby => "STANDBY",
            ControllerState::Disabled => "DISABLED",
            ControllerState::Enabled => "ENABLED",
            ControllerState::Offline => "OFFLINE",
            ControllerState::Fault => "FAULT",
        };
        f.write_str(name)
    }
}

/// Secondary state, only meaningful while the controller is [`ControllerState::Enabled`].
///
/// Outside ENABLED the substate is absent, transmitted as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnabledSubstate {
    /// Not moving; safe to stop.
    Stationary,
    /// Executing a point to point move.
    MovingPointToPoint,
    /// Decelerating after a stop request.
    ControlledStopping,
}

impl EnabledSubstate {
    /// Wire value of an optional substate.
    pub const fn wire_value(substate: Option<EnabledSubstate>) -> u32 {
        match substate {
            None => 0,
            Some(EnabledSubstate::Stationary) => 1,
            Some(EnabledSubstate::MovingPointToPoint) => 2,
            Some(EnabledSubstate::ControlledStopping) => 3,
        }
    }

    /// Decode an optional substate from its wire value.
    pub fn from_wire(value: u32) -> Result<Option<EnabledSubstate>, ProtocolError> {
        match value {
            0 => Ok(None),
            1 => Ok(Some(EnabledSubstate::Stationary)),
            2 => Ok(Some(EnabledSubstate::MovingPointToPoint)),
            3 => Ok(Some(EnabledSubstate::ControlledStopping)),
            value => Err(ProtocolError::InvalidEnum {
                field: "enabled_substate",
                value,
            }),
        }
    }
}

impl std::fmt::Display for EnabledSubstate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnabledSubstate::Stationary => "STATIONARY",
            EnabledSubstate::MovingPointToPoint => "MOVING_POINT_TO_POINT",
            EnabledSubstate::ControlledStopping => "CONTROLLED_STOPPING",
        };
        f.write_str(name)
    }
}

/// Values of `param1` for a `SET_STATE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SetStateParam {
    Invalid = 0,
    Start = 1,
    Enable = 2,
    Standby = 3,
    Disable = 4,
    Exit = 5,
    ClearError = 6,
    EnterControl = 7,
}

impl SetStateParam {
    /// Value to place in `param1`.
    pub const fn as_param(self) -> f64 {
        self as i32 as f64
    }
}

/// Outcome reported in a [`CommandStatus`](crate::CommandStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatusCode {
    /// Command accepted.
    Ack,
    /// Command rejected; the reason is non-empty.
    NoAck,
}

impl From<CommandStatusCode> for u32 {
    fn from(code: CommandStatusCode) -> Self {
        match code {
            CommandStatusCode::Ack => STATUS_ACK,
            CommandStatusCode::NoAck => STATUS_NO_ACK,
        }
    }
}

impl TryFrom<u32> for CommandStatusCode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            STATUS_ACK => Ok(CommandStatusCode::Ack),
            STATUS_NO_ACK => Ok(CommandStatusCode::NoAck),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }
}

impl std::fmt::Display for CommandStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CommandStatusCode::Ack => "ACK",
            CommandStatusCode::NoAck => "NO_ACK",
        })
    }
}

/// Bitmask reported in telemetry's `application_status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ApplicationStatus(pub u32);

impl ApplicationStatus {
    /// The last move has completed.
    pub const MOVE_COMPLETE: u32 = APP_STATUS_MOVE_COMPLETE;
    /// Drives are enabled.
    pub const DRIVES_ENABLED: u32 = APP_STATUS_DRIVES_ENABLED;
    /// The external command source holds commanding authority.
    pub const DDS_COMMAND_SOURCE: u32 = APP_STATUS_DDS_COMMAND_SOURCE;

    /// Whether all bits in `mask` are set.
    pub const fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Return a copy with the bits in `mask` set or cleared.
    pub const fn with(self, mask: u32, set: bool) -> Self {
        if set {
            ApplicationStatus(self.0 | mask)
        } else {
            ApplicationStatus(self.0 & !mask)
        }
    }
}
