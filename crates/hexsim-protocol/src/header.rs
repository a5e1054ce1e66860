//! Retained per-kind headers.

use chrono::{DateTime, Utc};

use crate::records::Header;
use crate::types::FrameId;

/// One retained [`Header`] per frame kind, stamped in place before every write.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    headers: [Header; FrameId::COUNT],
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderTable {
    pub fn new() -> Self {
        HeaderTable {
            headers: FrameId::ALL.map(Header::new),
        }
    }

    /// Stamp the header for `frame_id` with the current time.
    ///
    /// Returns the header and the instant it was stamped with, so callers can
    /// reuse the same instant for the payload.
    pub fn refresh(&mut self, frame_id: FrameId) -> (&mut Header, DateTime<Utc>) {
        let now = Utc::now();
        let header = &mut self.headers[frame_id.index()];
        stamp(header, now);
        (header, now)
    }

    /// Current value of the header for `frame_id`.
    pub fn get(&self, frame_id: FrameId) -> &Header {
        &self.headers[frame_id.index()]
    }
}

/// TAI - UTC, in seconds, since 2017-01-01.
pub const TAI_MINUS_UTC_SECS: i64 = 37;

/// Split `time` into whole TAI seconds and nanoseconds.
///
/// chrono represents a leap second as nanos >= 1e9; those are clamped.
pub fn stamp(header: &mut Header, time: DateTime<Utc>) {
    header.tai_sec = time.timestamp() + TAI_MINUS_UTC_SECS;
    header.tai_nsec = time.timestamp_subsec_nanos().min(999_999_999);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_headers_carry_frame_id() {
        let table = HeaderTable::new();
        for id in FrameId::ALL {
            assert_eq!(table.get(id).kind(), Ok(id));
            assert_eq!(table.get(id).tai_sec, 0);
        }
    }

    #[test]
    fn test_refresh_stamps_current_time() {
        let mut table = HeaderTable::new();
        let before = Utc::now().timestamp() + TAI_MINUS_UTC_SECS;
        let (header, now) = table.refresh(FrameId::Telemetry);
        assert_eq!(header.tai_sec, now.timestamp() + TAI_MINUS_UTC_SECS);
        assert_eq!(header.tai_nsec, now.timestamp_subsec_nanos());
        assert!(header.tai_sec >= before);
        // other kinds are untouched
        assert_eq!(table.get(FrameId::Config).tai_sec, 0);
    }

    #[test]
    fn test_refresh_is_monotonic() {
        let mut table = HeaderTable::new();
        let mut last = 0.0;
        for _ in 0..100 {
            let (header, _) = table.refresh(FrameId::CommandStatus);
            let t = header.timestamp_secs();
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_refresh_keeps_counter() {
        let mut table = HeaderTable::new();
        table.refresh(FrameId::CommandStatus).0.counter = 12;
        let (header, _) = table.refresh(FrameId::CommandStatus);
        assert_eq!(header.counter, 12);
    }

    #[test]
    fn test_stamp_clamps_leap_second() {
        let leap = Utc
            .timestamp_opt(1_483_228_799, 1_500_000_000)
            .single()
            .unwrap();
        let mut header = Header::new(FrameId::Telemetry);
        stamp(&mut header, leap);
        assert_eq!(header.tai_nsec, 999_999_999);
    }
}
