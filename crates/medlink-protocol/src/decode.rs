//! Typed decoding of history-log records and status-request responses.
//!
//! Decoders return `Option`: a record that fails bounds validation yields
//! `None` and is dropped, never clamped. Clamping would silently fabricate
//! plausible-looking but wrong physiological values.
//!
//! Batch decoders sort their output by the timestamp derived from the device
//! clock, since the device may deliver records out of chronological order
//! within a cargo.

use chrono::{DateTime, Utc};
use medlink_core::{
    BasalReading, BatteryStatus, BolusEvent, GlucoseReading, HardwareInfo, HistoryLogRecord,
    IobReading, ReservoirLevel,
};

/// Known history-log event-type identifiers.
pub mod event_type {
    /// Bolus delivery completed. Payload: bolus_id u16 | requested mU u32 |
    /// delivered mU u32.
    pub const BOLUS_DELIVERED: u16 = 0x0010;
    /// Programmed basal rate changed. Payload: rate mU/h u32.
    pub const BASAL_RATE_CHANGE: u16 = 0x0021;
    /// Live CGM estimated glucose value. Payload: glucose u16 | status u8 |
    /// trend i8.
    pub const CGM_EGV: u16 = 0x0100;
    /// Backfilled CGM value delivered after a link outage. Payload:
    /// gap_index u32 | glucose u16 | status u8 | trend i8.
    pub const CGM_BACKFILL: u16 = 0x0102;
}

/// Unix timestamp of the device epoch, 2008-01-01T00:00:00Z. The device
/// clock counts seconds from here.
const DEVICE_EPOCH_UNIX: i64 = 1_199_145_600;

/// Lowest physiologically plausible glucose value, inclusive.
pub const GLUCOSE_MIN_MG_DL: u16 = 1;
/// Highest physiologically plausible glucose value, inclusive.
pub const GLUCOSE_MAX_MG_DL: u16 = 500;
/// Status bit flagging a CGM sample the sensor itself marked invalid.
pub const STATUS_INVALID_SAMPLE: u8 = 0x01;

/// Hard plausibility ceiling for a single bolus, in milliunits.
const BOLUS_CEILING_MILLIUNITS: u32 = 50_000;
/// Hard plausibility ceiling for a basal rate, in milliunits per hour.
const BASAL_CEILING_MILLIUNITS_PER_HOUR: u32 = 25_000;
/// Hard plausibility ceiling for insulin-on-board, in milliunits.
const IOB_CEILING_MILLIUNITS: u32 = 50_000;
/// Hard plausibility ceiling for reservoir volume, in centiunits.
const RESERVOIR_CEILING_CENTIUNITS: u16 = 50_000;

/// Convert a device-clock value to UTC.
pub fn device_clock_to_utc(device_clock: u32) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(DEVICE_EPOCH_UNIX + i64::from(device_clock), 0)
        .unwrap_or_default()
}

fn read_u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn glucose_plausible(value: u16) -> bool {
    (GLUCOSE_MIN_MG_DL..=GLUCOSE_MAX_MG_DL).contains(&value)
}

/// Decode a CGM glucose reading from a history record.
///
/// The glucose value sits at a type-specific payload offset. Records with a
/// non-physiological value (zero or implausibly high) or an explicit
/// invalid-sample status flag are discarded.
pub fn decode_glucose(record: &HistoryLogRecord) -> Option<GlucoseReading> {
    let (glucose_offset, status_offset) = match record.event_type {
        event_type::CGM_EGV => (0, 2),
        event_type::CGM_BACKFILL => (4, 6),
        _ => return None,
    };

    let value = read_u16_le(&record.payload, glucose_offset)?;
    let status = *record.payload.get(status_offset)?;
    if !glucose_plausible(value) || status & STATUS_INVALID_SAMPLE != 0 {
        return None;
    }

    let trend = record.payload.get(status_offset + 1).map(|&b| b as i8);
    Some(GlucoseReading {
        value_mg_dl: value,
        timestamp: device_clock_to_utc(record.device_clock),
        sequence: record.sequence,
        trend,
    })
}

/// Decode a completed bolus from a history record.
pub fn decode_bolus(record: &HistoryLogRecord) -> Option<BolusEvent> {
    if record.event_type != event_type::BOLUS_DELIVERED {
        return None;
    }
    let bolus_id = read_u16_le(&record.payload, 0)?;
    let requested = read_u32_le(&record.payload, 2)?;
    let delivered = read_u32_le(&record.payload, 6)?;
    if requested > BOLUS_CEILING_MILLIUNITS || delivered > BOLUS_CEILING_MILLIUNITS {
        return None;
    }
    Some(BolusEvent {
        bolus_id,
        requested_units: f64::from(requested) / 1000.0,
        delivered_units: f64::from(delivered) / 1000.0,
        timestamp: device_clock_to_utc(record.device_clock),
        sequence: record.sequence,
    })
}

/// Decode a basal-rate change from a history record.
pub fn decode_basal(record: &HistoryLogRecord) -> Option<BasalReading> {
    if record.event_type != event_type::BASAL_RATE_CHANGE {
        return None;
    }
    let rate = read_u32_le(&record.payload, 0)?;
    if rate > BASAL_CEILING_MILLIUNITS_PER_HOUR {
        return None;
    }
    Some(BasalReading {
        units_per_hour: f64::from(rate) / 1000.0,
        timestamp: device_clock_to_utc(record.device_clock),
    })
}

/// Decode every glucose-bearing record in a batch, sorted by derived
/// timestamp.
pub fn decode_glucose_batch(records: &[HistoryLogRecord]) -> Vec<GlucoseReading> {
    let mut readings: Vec<_> = records.iter().filter_map(decode_glucose).collect();
    readings.sort_by_key(|r| r.timestamp);
    readings
}

/// Decode every bolus record in a batch, sorted by derived timestamp.
pub fn decode_bolus_batch(records: &[HistoryLogRecord]) -> Vec<BolusEvent> {
    let mut events: Vec<_> = records.iter().filter_map(decode_bolus).collect();
    events.sort_by_key(|e| e.timestamp);
    events
}

// =============================================================================
// Status-request responses
// =============================================================================
//
// Direct status requests bypass the history log and return small fixed
// frames. Same validation rule applies: out-of-bounds frames decode to None.

/// IoB response: milliunits u32 | device_clock u32.
pub fn decode_iob_response(bytes: &[u8]) -> Option<IobReading> {
    let milliunits = read_u32_le(bytes, 0)?;
    let clock = read_u32_le(bytes, 4)?;
    if milliunits > IOB_CEILING_MILLIUNITS {
        return None;
    }
    Some(IobReading {
        units: f64::from(milliunits) / 1000.0,
        timestamp: device_clock_to_utc(clock),
    })
}

/// Basal-rate response: milliunits/hour u32 | device_clock u32.
pub fn decode_basal_rate_response(bytes: &[u8]) -> Option<BasalReading> {
    let rate = read_u32_le(bytes, 0)?;
    let clock = read_u32_le(bytes, 4)?;
    if rate > BASAL_CEILING_MILLIUNITS_PER_HOUR {
        return None;
    }
    Some(BasalReading {
        units_per_hour: f64::from(rate) / 1000.0,
        timestamp: device_clock_to_utc(clock),
    })
}

/// Battery response: percent u8 | flags u8 (bit 0 = charging).
pub fn decode_battery_response(bytes: &[u8]) -> Option<BatteryStatus> {
    let percent = *bytes.first()?;
    let flags = *bytes.get(1)?;
    if percent > 100 {
        return None;
    }
    Some(BatteryStatus {
        percent,
        is_charging: flags & 0x01 != 0,
    })
}

/// Reservoir response: centiunits u16.
pub fn decode_reservoir_response(bytes: &[u8]) -> Option<ReservoirLevel> {
    let centiunits = read_u16_le(bytes, 0)?;
    if centiunits > RESERVOIR_CEILING_CENTIUNITS {
        return None;
    }
    Some(ReservoirLevel {
        units: f64::from(centiunits) / 100.0,
    })
}

/// Hardware-info response: model_id u16 | fw major u8 | fw minor u8 |
/// fw patch u8 | serial u32.
pub fn decode_hardware_info_response(bytes: &[u8]) -> Option<HardwareInfo> {
    let model_id = read_u16_le(bytes, 0)?;
    let major = *bytes.get(2)?;
    let minor = *bytes.get(3)?;
    let patch = *bytes.get(4)?;
    let serial = read_u32_le(bytes, 5)?;
    Some(HardwareInfo {
        model: format!("MT-{model_id:04}"),
        firmware_version: format!("{major}.{minor}.{patch}"),
        serial_number: format!("{serial:010}"),
    })
}
