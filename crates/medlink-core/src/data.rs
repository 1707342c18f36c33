//! Decoded telemetry value objects.
//!
//! Every reading carries a timestamp derived from the *device* clock, not the
//! wall-clock receipt time, so that backfilled history records sort correctly
//! against live data. Readings are only ever constructed from bytes that
//! passed bounds validation; invalid records are dropped, never clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw history-log entry as received from the device.
///
/// Immutable once received. The device-assigned `sequence` is the
/// de-duplication and incremental-fetch key: a client persists the maximum
/// seen sequence number and only requests records strictly after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLogRecord {
    /// Monotonic, device-assigned sequence number.
    pub sequence: u32,
    /// Wire event-type identifier.
    pub event_type: u16,
    /// Seconds since the device epoch.
    pub device_clock: u32,
    /// Type-specific payload bytes (8 for short records, 16 for stream records).
    pub payload: Vec<u8>,
}

/// A single CGM glucose sample, in mg/dL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub value_mg_dl: u16,
    pub timestamp: DateTime<Utc>,
    /// Device sequence number of the originating history record.
    pub sequence: u32,
    /// Raw trend arrow code, if the event type carries one.
    pub trend: Option<i8>,
}

/// A completed bolus delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BolusEvent {
    pub bolus_id: u16,
    pub requested_units: f64,
    pub delivered_units: f64,
    pub timestamp: DateTime<Utc>,
    pub sequence: u32,
}

/// The currently programmed basal rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalReading {
    pub units_per_hour: f64,
    pub timestamp: DateTime<Utc>,
}

/// Insulin-on-board as reported by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IobReading {
    pub units: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pump battery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: u8,
    pub is_charging: bool,
}

/// Remaining insulin in the reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservoirLevel {
    pub units: f64,
}

/// Static device identity, refreshed on the slow polling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// A decoded reading headed for the backend sync queue.
///
/// The sync layer itself is out of core scope; this is the narrow payload
/// type it accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Glucose(GlucoseReading),
    Bolus(BolusEvent),
    Basal(BasalReading),
    Iob(IobReading),
    Hardware(HardwareInfo),
}
