//! Fixed-size binary records.
//!
//! Every record has a fixed size and is packed little-endian with no padding:
//!
//! ```text
//! Header         (18 bytes)  frame_id:u16 | tai_sec:i64 | tai_nsec:u32 | counter:u32
//! Command        (56 bytes)  code:u32 | counter:u32 | param1..param6:f64
//! CommandStatus (268 bytes)  status:u32 | duration:f64 | reason:[u8; 256]
//! ```
//!
//! Config and telemetry layouts are device-defined; devices implement
//! [`WireRecord`] for them.

use bytes::{Buf, BufMut};

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::*;

/// A record with a fixed wire size.
pub trait WireRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded record to `buf`.
    fn encode(&self, buf: &mut impl BufMut);

    /// Decode a record from the front of `buf`.
    ///
    /// Implementations may assume `buf.remaining() >= Self::SIZE`;
    /// use [`decode_record`] to get that check.
    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError>;
}

/// Decode a record, checking that enough bytes are available first.
pub fn decode_record<R: WireRecord>(buf: &mut impl Buf) -> Result<R, ProtocolError> {
    if buf.remaining() < R::SIZE {
        return Err(ProtocolError::RecordTooShort {
            expected: R::SIZE,
            actual: buf.remaining(),
        });
    }
    R::decode_unchecked(buf)
}

/// Encode a record into a freshly allocated vector.
pub fn encode_record<R: WireRecord>(record: &R) -> Vec<u8> {
    let mut buf = Vec::with_capacity(R::SIZE);
    record.encode(&mut buf);
    buf
}

// ============================================================================
// Header
// ============================================================================

/// Header prefixed to every frame written by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw frame ID; see [`FrameId`].
    pub frame_id: u16,
    /// Whole seconds of the timestamp (TAI, unix epoch).
    pub tai_sec: i64,
    /// Nanosecond remainder of the timestamp, `0..=999_999_999`.
    pub tai_nsec: u32,
    /// Echo of the command counter; only meaningful for command status frames.
    pub counter: u32,
}

impl Header {
    /// Create a header for the given frame kind with a zero timestamp.
    pub fn new(frame_id: FrameId) -> Self {
        Header {
            frame_id: frame_id.into(),
            tai_sec: 0,
            tai_nsec: 0,
            counter: 0,
        }
    }

    /// Frame kind, if the ID is one this side knows.
    pub fn kind(&self) -> Result<FrameId, ProtocolError> {
        FrameId::try_from(self.frame_id)
    }

    /// Timestamp as floating point seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.tai_sec as f64 + self.tai_nsec as f64 * 1e-9
    }
}

impl WireRecord for Header {
    const SIZE: usize = 18;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.frame_id);
        buf.put_i64_le(self.tai_sec);
        buf.put_u32_le(self.tai_nsec);
        buf.put_u32_le(self.counter);
    }

    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Header {
            frame_id: buf.get_u16_le(),
            tai_sec: buf.get_i64_le(),
            tai_nsec: buf.get_u32_le(),
            counter: buf.get_u32_le(),
        })
    }
}

// ============================================================================
// Command
// ============================================================================

/// A command written by the client. Not wrapped in a [`Header`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Command {
    /// Command opcode.
    pub code: u32,
    /// Client-assigned correlation ID, echoed in the command status header.
    pub counter: u32,
    /// Device-defined parameters.
    pub params: [f64; COMMAND_PARAM_COUNT],
}

impl Command {
    /// Create a command with all parameters zero.
    pub fn new(code: u32, counter: u32) -> Self {
        Command {
            code,
            counter,
            params: [0.0; COMMAND_PARAM_COUNT],
        }
    }

    /// Set `param1`.
    pub fn with_param1(mut self, value: f64) -> Self {
        self.params[0] = value;
        self
    }

    /// Set all six parameters.
    pub fn with_params(mut self, params: [f64; COMMAND_PARAM_COUNT]) -> Self {
        self.params = params;
        self
    }

    pub fn param1(&self) -> f64 {
        self.params[0]
    }

    pub fn param2(&self) -> f64 {
        self.params[1]
    }
}

impl WireRecord for Command {
    const SIZE: usize = 4 + 4 + 8 * COMMAND_PARAM_COUNT;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.code);
        buf.put_u32_le(self.counter);
        for param in self.params {
            buf.put_f64_le(param);
        }
    }

    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let code = buf.get_u32_le();
        let counter = buf.get_u32_le();
        let mut params = [0.0; COMMAND_PARAM_COUNT];
        for param in params.iter_mut() {
            *param = buf.get_f64_le();
        }
        Ok(Command {
            code,
            counter,
            params,
        })
    }
}

// ============================================================================
// CommandStatus
// ============================================================================

/// Acknowledgement written once per command read.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatus {
    /// ACK or NO_ACK.
    pub status: CommandStatusCode,
    /// Estimated seconds until the command's effect is complete; 0 if already done.
    pub duration: f64,
    /// Reason for rejection; empty for ACK.
    pub reason: String,
}

impl CommandStatus {
    /// An acknowledgement with the given estimated duration.
    pub fn ack(duration: f64) -> Self {
        CommandStatus {
            status: CommandStatusCode::Ack,
            duration,
            reason: String::new(),
        }
    }

    /// A rejection. An empty reason is replaced so that NO_ACK always explains itself.
    pub fn no_ack(reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.is_empty() {
            reason.push_str("command failed");
        }
        CommandStatus {
            status: CommandStatusCode::NoAck,
            duration: 0.0,
            reason: truncate_reason(&reason).to_string(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.status == CommandStatusCode::Ack
    }
}

/// Longest prefix of `reason` that fits the reason field without splitting a UTF-8 character.
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= COMMAND_STATUS_REASON_LEN {
        return reason;
    }
    let mut end = COMMAND_STATUS_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    log::debug!("truncating command status reason from {} to {end} bytes", reason.len());
    &reason[..end]
}

impl WireRecord for CommandStatus {
    const SIZE: usize = 4 + 8 + COMMAND_STATUS_REASON_LEN;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.status.into());
        buf.put_f64_le(self.duration);
        let reason = truncate_reason(&self.reason).as_bytes();
        buf.put_slice(reason);
        buf.put_bytes(0, COMMAND_STATUS_REASON_LEN - reason.len());
    }

    fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        let status = CommandStatusCode::try_from(buf.get_u32_le())?;
        let duration = buf.get_f64_le();
        let mut raw = [0u8; COMMAND_STATUS_REASON_LEN];
        buf.copy_to_slice(&mut raw);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(CommandStatus {
            status,
            duration,
            reason: String::from_utf8_lossy(&raw[..end]).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header {
            frame_id: FRAME_ID_COMMAND_STATUS,
            tai_sec: 0x0102030405060708,
            tai_nsec: 999_999_999,
            counter: 7,
        };
        let bytes = encode_record(&header);
        assert_eq!(bytes.len(), Header::SIZE);
        assert_eq!(&bytes[0..2], &[1, 0]);
        assert_eq!(&bytes[2..10], &0x0102030405060708i64.to_le_bytes());
        assert_eq!(&bytes[10..14], &999_999_999u32.to_le_bytes());
        assert_eq!(&bytes[14..18], &[7, 0, 0, 0]);

        let decoded: Header = decode_record(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.kind(), Ok(FrameId::CommandStatus));
    }

    #[test]
    fn test_command_from_raw_bytes() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&42u32.to_le_bytes());
        raw.extend_from_slice(&2.0f64.to_le_bytes());
        for _ in 1..COMMAND_PARAM_COUNT {
            raw.extend_from_slice(&0.5f64.to_le_bytes());
        }
        assert_eq!(raw.len(), Command::SIZE);

        let command: Command = decode_record(&mut raw.as_slice()).unwrap();
        assert_eq!(command.code, CMD_SET_STATE);
        assert_eq!(command.counter, 42);
        assert_eq!(command.param1(), SetStateParam::Enable.as_param());
        assert_eq!(command.param2(), 0.5);
    }

    #[test]
    fn test_command_too_short() {
        let raw = [0u8; 10];
        let result: Result<Command, _> = decode_record(&mut &raw[..]);
        assert_eq!(
            result,
            Err(ProtocolError::RecordTooShort {
                expected: Command::SIZE,
                actual: 10
            })
        );
    }

    #[test]
    fn test_command_status_reason_padding() {
        let status = CommandStatus::no_ack("state=STANDBY; must be ENABLED");
        let bytes = encode_record(&status);
        assert_eq!(bytes.len(), CommandStatus::SIZE);
        assert_eq!(&bytes[0..4], &STATUS_NO_ACK.to_le_bytes());
        assert!(bytes[12 + status.reason.len()..].iter().all(|&b| b == 0));

        let decoded: CommandStatus = decode_record(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn test_too_long_reason_is_truncated() {
        let too_long = "ab".repeat(COMMAND_STATUS_REASON_LEN);
        let status = CommandStatus::no_ack(too_long.clone());
        assert_eq!(status.reason.len(), COMMAND_STATUS_REASON_LEN);

        let bytes = encode_record(&status);
        let decoded: CommandStatus = decode_record(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded.reason.as_bytes(), &too_long.as_bytes()[..COMMAND_STATUS_REASON_LEN]);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 'é' is two bytes; an odd offset forces a boundary inside a character
        let reason = format!("x{}", "é".repeat(COMMAND_STATUS_REASON_LEN));
        let truncated = truncate_reason(&reason);
        assert!(truncated.len() <= COMMAND_STATUS_REASON_LEN);
        assert_eq!(truncated.len(), COMMAND_STATUS_REASON_LEN - 1);
    }

    #[test]
    fn test_no_ack_reason_never_empty() {
        let status = CommandStatus::no_ack("");
        assert!(!status.reason.is_empty());
        assert!(!status.is_ack());
    }

    #[test]
    fn test_unknown_status_code() {
        let mut bytes = encode_record(&CommandStatus::ack(1.5));
        bytes[0] = 9;
        let result: Result<CommandStatus, _> = decode_record(&mut bytes.as_slice());
        assert_eq!(result, Err(ProtocolError::UnknownStatus(9)));
    }
}
