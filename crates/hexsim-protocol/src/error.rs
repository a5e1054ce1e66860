//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding controller frames and records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes to decode a record.
    #[error("record too short: expected {expected} bytes, got {actual}")]
    RecordTooShort {
        /// Size of the record.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Header carries a frame ID this side does not know how to size.
    #[error("unknown frame id: {0}")]
    UnknownFrameId(u16),

    /// Command status code other than ACK or NO_ACK.
    #[error("unknown command status code: {0}")]
    UnknownStatus(u32),

    /// Enumerated field holds a value with no matching variant.
    #[error("invalid {field} value: {value}")]
    InvalidEnum {
        /// Name of the field being decoded.
        field: &'static str,
        /// Raw value read from the wire.
        value: u32,
    },
}
