//! Wire-frame encoders for device emulation.
//!
//! The host never *sends* history records, so production code has no use for
//! these; they exist so mock drivers and tests can emit byte-exact frames and
//! feed them back through the decoders in `records`/`decode`.

use crate::records::{CARGO_HEADER_LEN, RECORD_A_LEN, RECORD_B_LEN};

/// Encode a stream (shape B) record.
pub fn encode_stream_record(
    event_type: u16,
    device_clock: u32,
    sequence: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_B_LEN);
    out.extend_from_slice(&event_type.to_le_bytes());
    out.extend_from_slice(&device_clock.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    let mut padded = data.to_vec();
    padded.resize(16, 0);
    out.extend_from_slice(&padded);
    out
}

/// Encode a short (shape A) record.
pub fn encode_short_record(
    sequence: u32,
    event_type: u16,
    device_clock: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_A_LEN);
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&event_type.to_le_bytes());
    out.extend_from_slice(&device_clock.to_le_bytes());
    let mut padded = payload.to_vec();
    padded.resize(8, 0);
    out.extend_from_slice(&padded);
    out
}

/// Encode a count-prefixed cargo of already-encoded stream records.
pub fn encode_cargo(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CARGO_HEADER_LEN + records.len() * RECORD_B_LEN);
    out.push(records.len() as u8);
    out.push(0x00); // flags, unused by the decoder
    for record in records {
        out.extend_from_slice(record);
    }
    out
}

/// CGM EGV payload: glucose u16 | status u8 | trend i8.
pub fn encode_cgm_egv_payload(glucose_mg_dl: u16, status: u8, trend: i8) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    out.extend_from_slice(&glucose_mg_dl.to_le_bytes());
    out.push(status);
    out.push(trend as u8);
    out
}

/// Bolus-delivered payload: bolus_id u16 | requested mU u32 | delivered mU u32.
pub fn encode_bolus_payload(bolus_id: u16, requested_mu: u32, delivered_mu: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    out.extend_from_slice(&bolus_id.to_le_bytes());
    out.extend_from_slice(&requested_mu.to_le_bytes());
    out.extend_from_slice(&delivered_mu.to_le_bytes());
    out
}

/// IoB status response: milliunits u32 | device_clock u32.
pub fn encode_iob_response(milliunits: u32, device_clock: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&milliunits.to_le_bytes());
    out.extend_from_slice(&device_clock.to_le_bytes());
    out
}

/// Battery status response: percent u8 | flags u8.
pub fn encode_battery_response(percent: u8, is_charging: bool) -> Vec<u8> {
    vec![percent, u8::from(is_charging)]
}

/// Reservoir status response: centiunits u16.
pub fn encode_reservoir_response(centiunits: u16) -> Vec<u8> {
    centiunits.to_le_bytes().to_vec()
}

/// Hardware-info response: model_id u16 | fw maj/min/patch | serial u32.
pub fn encode_hardware_info_response(
    model_id: u16,
    firmware: (u8, u8, u8),
    serial: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.extend_from_slice(&model_id.to_le_bytes());
    out.push(firmware.0);
    out.push(firmware.1);
    out.push(firmware.2);
    out.extend_from_slice(&serial.to_le_bytes());
    out
}
