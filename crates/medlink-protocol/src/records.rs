//! Wire record parsing for the pump history-log subsystem.
//!
//! The device produces two record shapes, both little-endian:
//!
//! ```text
//! Record A (short, 18 bytes):
//!   sequence u32 | event_type u16 | device_clock u32 | payload [u8; 8]
//!
//! Record B (stream, 26 bytes):
//!   event_type u16 | device_clock u32 | sequence u32 | data [u8; 16]
//!
//! Cargo (batched):
//!   count u8 | flags u8 | count x Record B
//! ```
//!
//! Parsing tries the stream shape first and falls back to the short shape.
//! A record whose event-type identifier falls outside the known range is
//! rejected entirely, not decoded on a best-effort basis: this protocol was
//! reverse engineered and an unknown identifier means the framing guess is
//! probably wrong for those bytes.

use medlink_core::HistoryLogRecord;

/// Length of the short fixed record shape.
pub const RECORD_A_LEN: usize = 18;
/// Length of the stream record shape.
pub const RECORD_B_LEN: usize = 26;
/// Count byte plus flags byte.
pub const CARGO_HEADER_LEN: usize = 2;
/// A cargo shorter than this cannot contain a single record.
pub const MIN_CARGO_LEN: usize = CARGO_HEADER_LEN + RECORD_B_LEN;

/// Lowest known event-type identifier.
pub const EVENT_TYPE_MIN: u16 = 0x0001;
/// Highest known event-type identifier.
pub const EVENT_TYPE_MAX: u16 = 0x01FF;

fn known_event_type(event_type: u16) -> bool {
    (EVENT_TYPE_MIN..=EVENT_TYPE_MAX).contains(&event_type)
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse a stream (shape B) record.
pub fn parse_stream_record(bytes: &[u8]) -> Option<HistoryLogRecord> {
    if bytes.len() < RECORD_B_LEN {
        return None;
    }
    let event_type = read_u16_le(bytes, 0)?;
    if !known_event_type(event_type) {
        return None;
    }
    Some(HistoryLogRecord {
        event_type,
        device_clock: read_u32_le(bytes, 2)?,
        sequence: read_u32_le(bytes, 6)?,
        payload: bytes[10..RECORD_B_LEN].to_vec(),
    })
}

/// Parse a short (shape A) record.
pub fn parse_short_record(bytes: &[u8]) -> Option<HistoryLogRecord> {
    if bytes.len() < RECORD_A_LEN {
        return None;
    }
    let event_type = read_u16_le(bytes, 4)?;
    if !known_event_type(event_type) {
        return None;
    }
    Some(HistoryLogRecord {
        sequence: read_u32_le(bytes, 0)?,
        event_type,
        device_clock: read_u32_le(bytes, 6)?,
        payload: bytes[10..RECORD_A_LEN].to_vec(),
    })
}

/// Parse a single history-log record of either shape.
///
/// Tries the stream shape first, then falls back to the short shape.
/// Returns `None` when neither shape yields a known event type.
pub fn parse_history_log_record(bytes: &[u8]) -> Option<HistoryLogRecord> {
    parse_stream_record(bytes).or_else(|| parse_short_record(bytes))
}

/// Split and decode a count-prefixed batch of stream records, keeping only
/// records with a sequence number strictly greater than `since_sequence`.
///
/// The batch is split deterministically by the fixed stream-record length.
/// A cargo shorter than [`MIN_CARGO_LEN`] yields no records rather than an
/// error; a count byte larger than the bytes actually present is truncated
/// to what fits. Individual records that fail to parse are skipped.
pub fn parse_history_log_stream_cargo(bytes: &[u8], since_sequence: u32) -> Vec<HistoryLogRecord> {
    if bytes.len() < MIN_CARGO_LEN {
        return Vec::new();
    }

    let declared = bytes[0] as usize;
    let available = (bytes.len() - CARGO_HEADER_LEN) / RECORD_B_LEN;
    let count = declared.min(available);

    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let start = CARGO_HEADER_LEN + i * RECORD_B_LEN;
        let chunk = &bytes[start..start + RECORD_B_LEN];
        match parse_stream_record(chunk) {
            Some(record) if record.sequence > since_sequence => records.push(record),
            Some(_) => {}
            None => {
                tracing::debug!(index = i, "skipping unparseable stream record in cargo");
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_cargo, encode_short_record, encode_stream_record};

    #[test]
    fn stream_record_roundtrips_fields() {
        let bytes = encode_stream_record(0x0100, 1000, 42, &[1, 2, 3]);
        let record = parse_history_log_record(&bytes).unwrap();
        assert_eq!(record.event_type, 0x0100);
        assert_eq!(record.device_clock, 1000);
        assert_eq!(record.sequence, 42);
        assert_eq!(record.payload.len(), 16);
        assert_eq!(&record.payload[..3], &[1, 2, 3]);
    }

    #[test]
    fn falls_back_to_short_shape() {
        // 18 bytes cannot be a stream record, so the fallback must engage.
        let bytes = encode_short_record(7, 0x0010, 500, &[9, 9]);
        let record = parse_history_log_record(&bytes).unwrap();
        assert_eq!(record.sequence, 7);
        assert_eq!(record.event_type, 0x0010);
        assert_eq!(record.payload.len(), 8);
    }

    #[test]
    fn unknown_event_type_rejects_record() {
        let bytes = encode_stream_record(0x0200, 1000, 42, &[]);
        assert!(parse_stream_record(&bytes).is_none());
        let bytes = encode_short_record(7, 0x0000, 500, &[]);
        assert!(parse_short_record(&bytes).is_none());
    }

    #[test]
    fn cargo_filter_is_strictly_greater_than() {
        let record = encode_stream_record(0x0100, 1000, 10, &[]);
        let cargo = encode_cargo(&[record]);

        // since == N filters the record out
        assert!(parse_history_log_stream_cargo(&cargo, 10).is_empty());
        // since == N-1 keeps exactly one
        let kept = parse_history_log_stream_cargo(&cargo, 9);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sequence, 10);
    }

    #[test]
    fn undersized_cargo_yields_no_records() {
        assert!(parse_history_log_stream_cargo(&[], 0).is_empty());
        assert!(parse_history_log_stream_cargo(&[1, 0, 0xAA], 0).is_empty());
        let just_short = vec![0u8; MIN_CARGO_LEN - 1];
        assert!(parse_history_log_stream_cargo(&just_short, 0).is_empty());
    }

    #[test]
    fn overdeclared_count_is_truncated() {
        let record = encode_stream_record(0x0100, 1000, 5, &[]);
        let mut cargo = encode_cargo(&[record]);
        cargo[0] = 9; // claims nine records, only one present
        assert_eq!(parse_history_log_stream_cargo(&cargo, 0).len(), 1);
    }

    #[test]
    fn cargo_skips_unparseable_records() {
        let good = encode_stream_record(0x0100, 1000, 5, &[]);
        let bad = encode_stream_record(0x0300, 1000, 6, &[]); // unknown type
        let cargo = encode_cargo(&[bad, good]);
        let records = parse_history_log_stream_cargo(&cargo, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, 5);
    }
}
