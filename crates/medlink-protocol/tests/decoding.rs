//! End-to-end decoder tests: encoded wire frames through framing and
//! semantic decoding.

use medlink_protocol::encode::{
    encode_battery_response, encode_bolus_payload, encode_cargo, encode_cgm_egv_payload,
    encode_hardware_info_response, encode_iob_response, encode_reservoir_response,
    encode_stream_record,
};
use medlink_protocol::{
    decode_battery_response, decode_bolus_batch, decode_glucose_batch,
    decode_hardware_info_response, decode_iob_response, decode_reservoir_response,
    device_clock_to_utc, event_type, parse_history_log_stream_cargo,
};

fn cgm_record(sequence: u32, clock: u32, glucose: u16, status: u8) -> Vec<u8> {
    encode_stream_record(
        event_type::CGM_EGV,
        clock,
        sequence,
        &encode_cgm_egv_payload(glucose, status, 1),
    )
}

#[test]
fn glucose_bounds_are_inclusive() {
    let cargo = encode_cargo(&[
        cgm_record(1, 100, 0, 0),   // zero: dropped
        cgm_record(2, 200, 1, 0),   // floor: kept
        cgm_record(3, 300, 500, 0), // ceiling: kept
        cgm_record(4, 400, 501, 0), // above ceiling: dropped
    ]);
    let records = parse_history_log_stream_cargo(&cargo, 0);
    assert_eq!(records.len(), 4);

    let readings = decode_glucose_batch(&records);
    let values: Vec<u16> = readings.iter().map(|r| r.value_mg_dl).collect();
    assert_eq!(values, vec![1, 500]);
}

#[test]
fn invalid_sample_flag_drops_reading() {
    let cargo = encode_cargo(&[cgm_record(1, 100, 120, 0x01)]);
    let records = parse_history_log_stream_cargo(&cargo, 0);
    assert_eq!(records.len(), 1);
    assert!(decode_glucose_batch(&records).is_empty());
}

#[test]
fn batches_are_sorted_by_device_timestamp() {
    // Delivered out of chronological order, as the device sometimes does.
    let cargo = encode_cargo(&[
        cgm_record(10, 3000, 110, 0),
        cgm_record(11, 1000, 111, 0),
        cgm_record(12, 2000, 112, 0),
    ]);
    let readings = decode_glucose_batch(&parse_history_log_stream_cargo(&cargo, 0));
    let values: Vec<u16> = readings.iter().map(|r| r.value_mg_dl).collect();
    assert_eq!(values, vec![111, 112, 110]);
    assert!(readings.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn bolus_records_decode_with_milliunit_scaling() {
    let cargo = encode_cargo(&[encode_stream_record(
        event_type::BOLUS_DELIVERED,
        5000,
        20,
        &encode_bolus_payload(7, 2500, 2400),
    )]);
    let events = decode_bolus_batch(&parse_history_log_stream_cargo(&cargo, 0));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].bolus_id, 7);
    assert!((events[0].requested_units - 2.5).abs() < f64::EPSILON);
    assert!((events[0].delivered_units - 2.4).abs() < f64::EPSILON);
    assert_eq!(events[0].timestamp, device_clock_to_utc(5000));
}

#[test]
fn implausible_bolus_is_dropped_not_clamped() {
    let cargo = encode_cargo(&[encode_stream_record(
        event_type::BOLUS_DELIVERED,
        5000,
        20,
        &encode_bolus_payload(7, 999_999, 999_999),
    )]);
    let events = decode_bolus_batch(&parse_history_log_stream_cargo(&cargo, 0));
    assert!(events.is_empty());
}

#[test]
fn status_responses_roundtrip() {
    let iob = decode_iob_response(&encode_iob_response(1250, 9000)).unwrap();
    assert!((iob.units - 1.25).abs() < f64::EPSILON);
    assert_eq!(iob.timestamp, device_clock_to_utc(9000));

    let battery = decode_battery_response(&encode_battery_response(87, true)).unwrap();
    assert_eq!(battery.percent, 87);
    assert!(battery.is_charging);
    assert!(decode_battery_response(&encode_battery_response(101, false)).is_none());

    let reservoir = decode_reservoir_response(&encode_reservoir_response(15_025)).unwrap();
    assert!((reservoir.units - 150.25).abs() < f64::EPSILON);

    let hw = decode_hardware_info_response(&encode_hardware_info_response(
        42,
        (2, 1, 7),
        123_456,
    ))
    .unwrap();
    assert_eq!(hw.model, "MT-0042");
    assert_eq!(hw.firmware_version, "2.1.7");
    assert_eq!(hw.serial_number, "0000123456");
}

#[test]
fn truncated_status_responses_decode_to_none() {
    assert!(decode_iob_response(&[0x01, 0x02]).is_none());
    assert!(decode_battery_response(&[50]).is_none());
    assert!(decode_reservoir_response(&[0x10]).is_none());
    assert!(decode_hardware_info_response(&[0x2A, 0x00, 2]).is_none());
}
