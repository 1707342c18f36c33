//! Binary telemetry decoder for the reverse-engineered pump protocol.
//!
//! Pure functions only: this crate turns raw byte records into typed,
//! validated readings and performs no I/O. Records that fail bounds
//! validation are dropped, not clamped.
//!
//! # Layers
//!
//! - [`records`] — framing: the two history-log record shapes and the
//!   count-prefixed stream cargo.
//! - [`decode`] — semantics: event-type dispatch, physiological bounds,
//!   device-clock timestamps.
//! - [`encode`] — device emulation support for mock drivers and tests.

pub mod decode;
pub mod encode;
pub mod records;

pub use decode::{
    decode_basal, decode_basal_rate_response, decode_battery_response, decode_bolus,
    decode_bolus_batch, decode_glucose, decode_glucose_batch, decode_hardware_info_response,
    decode_iob_response, decode_reservoir_response, device_clock_to_utc, event_type,
    GLUCOSE_MAX_MG_DL, GLUCOSE_MIN_MG_DL, STATUS_INVALID_SAMPLE,
};
pub use records::{
    parse_history_log_record, parse_history_log_stream_cargo, parse_short_record,
    parse_stream_record, EVENT_TYPE_MAX, EVENT_TYPE_MIN, MIN_CARGO_LEN, RECORD_A_LEN, RECORD_B_LEN,
};
