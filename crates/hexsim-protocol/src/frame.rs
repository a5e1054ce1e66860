//! Frame encoding/decoding utilities.
//!
//! Every record written by the controller is prefixed with a [`Header`]:
//!
//! ```text
//! +-------------------+---------------------------------+
//! | Header (18 bytes) | payload (size set by frame_id)  |
//! +-------------------+---------------------------------+
//! ```
//!
//! The payload size is implied by the frame ID, so there is no length field.
//! Commands travel the other way without a header.

use std::marker::PhantomData;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::records::{decode_record, CommandStatus, Header, WireRecord};
use crate::types::FrameId;

/// Initial capacity of the decode buffer.
pub const DECODE_BUFFER_SIZE: usize = 4096;

/// Encode a header and its payload into one contiguous buffer.
///
/// The whole frame must go out in a single write so that frames from the
/// command path and the telemetry path never interleave.
pub fn encode_frame<R: WireRecord>(header: &Header, payload: &R) -> Bytes {
    let mut buf = BytesMut::with_capacity(Header::SIZE + R::SIZE);
    header.encode(&mut buf);
    payload.encode(&mut buf);
    buf.freeze()
}

/// A decoded frame, parameterised over the device's config and telemetry records.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<C, T> {
    CommandStatus(Header, CommandStatus),
    Config(Header, C),
    Telemetry(Header, T),
}

impl<C, T> Frame<C, T> {
    /// Header of the frame.
    pub fn header(&self) -> &Header {
        match self {
            Frame::CommandStatus(header, _) => header,
            Frame::Config(header, _) => header,
            Frame::Telemetry(header, _) => header,
        }
    }

    /// Kind of the frame.
    pub fn kind(&self) -> FrameId {
        match self {
            Frame::CommandStatus(..) => FrameId::CommandStatus,
            Frame::Config(..) => FrameId::Config,
            Frame::Telemetry(..) => FrameId::Telemetry,
        }
    }
}

/// Incremental decoder for the controller → client stream.
#[derive(Debug)]
pub struct FrameDecoder<C, T> {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    _records: PhantomData<fn() -> (C, T)>,
}

impl<C: WireRecord, T: WireRecord> Default for FrameDecoder<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: WireRecord, T: WireRecord> FrameDecoder<C, T> {
    pub fn new() -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(DECODE_BUFFER_SIZE),
            _records: PhantomData,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Payload size for a frame kind.
    pub fn payload_size(frame_id: FrameId) -> usize {
        match frame_id {
            FrameId::CommandStatus => CommandStatus::SIZE,
            FrameId::Config => C::SIZE,
            FrameId::Telemetry => T::SIZE,
        }
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. An unknown frame ID leaves
    /// the stream unsynchronised, so the buffer is flushed before the error
    /// is returned.
    pub fn decode(&mut self) -> Result<Option<Frame<C, T>>, ProtocolError> {
        if self.buffer.len() < Header::SIZE {
            return Ok(None);
        }

        let frame_id = u16::from_le_bytes([self.buffer[0], self.buffer[1]]);
        let kind = match FrameId::try_from(frame_id) {
            Ok(kind) => kind,
            Err(e) => {
                log::warn!(
                    "unknown frame id {frame_id}; discarding {} buffered bytes",
                    self.buffer.len()
                );
                self.buffer.clear();
                return Err(e);
            }
        };

        let frame_len = Header::SIZE + Self::payload_size(kind);
        if self.buffer.len() < frame_len {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(frame_len);
        let header: Header = decode_record(&mut frame)?;
        let decoded = match kind {
            FrameId::CommandStatus => Frame::CommandStatus(header, decode_record(&mut frame)?),
            FrameId::Config => Frame::Config(header, decode_record(&mut frame)?),
            FrameId::Telemetry => Frame::Telemetry(header, decode_record(&mut frame)?),
        };
        debug_assert!(!frame.has_remaining());
        Ok(Some(decoded))
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    /// Two-field record standing in for a device config.
    #[derive(Debug, Clone, PartialEq)]
    struct TestConfig {
        limit: f64,
        enabled: bool,
    }

    impl WireRecord for TestConfig {
        const SIZE: usize = 9;

        fn encode(&self, buf: &mut impl BufMut) {
            buf.put_f64_le(self.limit);
            buf.put_u8(self.enabled as u8);
        }

        fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
            Ok(TestConfig {
                limit: buf.get_f64_le(),
                enabled: buf.get_u8() != 0,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct TestTelemetry {
        state: u32,
    }

    impl WireRecord for TestTelemetry {
        const SIZE: usize = 4;

        fn encode(&self, buf: &mut impl BufMut) {
            buf.put_u32_le(self.state);
        }

        fn decode_unchecked(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
            Ok(TestTelemetry {
                state: buf.get_u32_le(),
            })
        }
    }

    type TestDecoder = FrameDecoder<TestConfig, TestTelemetry>;

    fn header(kind: FrameId, counter: u32) -> Header {
        Header {
            counter,
            tai_sec: 1_700_000_000,
            tai_nsec: 5,
            ..Header::new(kind)
        }
    }

    #[test]
    fn test_encode_frame_is_contiguous() {
        let status = CommandStatus::ack(2.5);
        let frame = encode_frame(&header(FrameId::CommandStatus, 3), &status);
        assert_eq!(frame.len(), Header::SIZE + CommandStatus::SIZE);
        assert_eq!(&frame[0..2], &[1, 0]);
        assert_eq!(&frame[14..18], &3u32.to_le_bytes());
    }

    #[test]
    fn test_decoder_encode_decode() {
        let mut decoder = TestDecoder::new();
        let status = CommandStatus::no_ack("Unrecognized command code 99");
        decoder.push(&encode_frame(&header(FrameId::CommandStatus, 7), &status));

        match decoder.decode().unwrap() {
            Some(Frame::CommandStatus(h, s)) => {
                assert_eq!(h.counter, 7);
                assert_eq!(s, status);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_decoder_partial() {
        let mut decoder = TestDecoder::new();
        let config = TestConfig {
            limit: 25.0,
            enabled: true,
        };
        let encoded = encode_frame(&header(FrameId::Config, 0), &config);

        // Header alone is not enough
        decoder.push(&encoded[..Header::SIZE]);
        assert_eq!(decoder.decode(), Ok(None));

        decoder.push(&encoded[Header::SIZE..]);
        let frame = decoder.decode().unwrap().expect("should decode frame");
        assert_eq!(frame.kind(), FrameId::Config);
        assert_eq!(frame, Frame::Config(header(FrameId::Config, 0), config));
    }

    #[test]
    fn test_decoder_multiple() {
        let mut decoder = TestDecoder::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(
            &header(FrameId::Config, 0),
            &TestConfig {
                limit: 1.0,
                enabled: false,
            },
        ));
        for state in 0..3 {
            stream.extend_from_slice(&encode_frame(
                &header(FrameId::Telemetry, 0),
                &TestTelemetry { state },
            ));
        }
        decoder.push(&stream);

        assert_eq!(decoder.decode().unwrap().unwrap().kind(), FrameId::Config);
        for state in 0..3 {
            match decoder.decode().unwrap() {
                Some(Frame::Telemetry(_, t)) => assert_eq!(t.state, state),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert_eq!(decoder.decode(), Ok(None));
    }

    #[test]
    fn test_decoder_unknown_frame_id_flushes() {
        let mut decoder = TestDecoder::new();
        let mut bad = header(FrameId::Telemetry, 0);
        bad.frame_id = 1025;
        decoder.push(&encode_frame(&bad, &TestTelemetry { state: 0 }));

        assert_eq!(decoder.decode(), Err(ProtocolError::UnknownFrameId(1025)));
        assert_eq!(decoder.buffered_len(), 0);

        // The decoder resynchronises on the next complete frame
        decoder.push(&encode_frame(
            &header(FrameId::Telemetry, 0),
            &TestTelemetry { state: 2 },
        ));
        assert!(matches!(decoder.decode(), Ok(Some(Frame::Telemetry(..)))));
    }
}
