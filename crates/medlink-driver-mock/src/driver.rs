//! Scriptable mock implementation of [`PumpDriver`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medlink_core::{
    BasalReading, BatteryStatus, BolusEvent, ConnectionState, HardwareInfo, IobReading,
    PumpDriver, ReservoirLevel,
};
use medlink_protocol::encode::{
    encode_battery_response, encode_bolus_payload, encode_cargo, encode_cgm_egv_payload,
    encode_hardware_info_response, encode_iob_response, encode_reservoir_response,
    encode_stream_record,
};
use medlink_protocol::{
    decode_basal_rate_response, decode_battery_response, decode_bolus, decode_hardware_info_response,
    decode_iob_response, decode_reservoir_response, event_type, parse_stream_record,
};
use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;

/// A cargo frame carries at most a u8 count of records.
const MAX_RECORDS_PER_CARGO: usize = u8::MAX as usize;

struct MockState {
    address: Option<String>,
    /// Encoded stream records keyed by sequence number.
    history: BTreeMap<u32, Vec<u8>>,
    iob_milliunits: u32,
    basal_milliunits_per_hour: u32,
    device_clock: u32,
    battery_percent: u8,
    battery_charging: bool,
    reservoir_centiunits: u16,
    model_id: u16,
    firmware: (u8, u8, u8),
    serial: u32,
    /// Remaining injected failures per operation name.
    failures: HashMap<&'static str, u32>,
    /// Order of requests issued over the link, for sequencing assertions.
    request_log: Vec<&'static str>,
    /// Optional reading noise, seeded for determinism.
    noise: Option<ChaCha8Rng>,
}

/// Simulated insulin pump, scripted from test code.
pub struct MockPumpDriver {
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<MockState>,
}

impl Default for MockPumpDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPumpDriver {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            inner: Mutex::new(MockState {
                address: None,
                history: BTreeMap::new(),
                iob_milliunits: 1_200,
                basal_milliunits_per_hour: 850,
                device_clock: 100_000,
                battery_percent: 80,
                battery_charging: false,
                reservoir_centiunits: 15_000,
                model_id: 42,
                firmware: (2, 1, 7),
                serial: 123_456,
                failures: HashMap::new(),
                request_log: Vec::new(),
                noise: None,
            }),
        }
    }

    /// Enable ±1% noise on IoB readings, seeded for reproducibility.
    pub fn with_noise(self, seed: u64) -> Self {
        self.inner.lock().noise = Some(ChaCha8Rng::seed_from_u64(seed));
        self
    }

    // -------------------------------------------------------------------------
    // Test scripting
    // -------------------------------------------------------------------------

    /// Append a CGM EGV history record.
    pub fn push_cgm_record(&self, sequence: u32, device_clock: u32, glucose_mg_dl: u16) {
        let payload = encode_cgm_egv_payload(glucose_mg_dl, 0, 0);
        self.push_raw_record(event_type::CGM_EGV, sequence, device_clock, &payload);
    }

    /// Append a completed-bolus history record.
    pub fn push_bolus_record(
        &self,
        sequence: u32,
        device_clock: u32,
        bolus_id: u16,
        requested_mu: u32,
        delivered_mu: u32,
    ) {
        let payload = encode_bolus_payload(bolus_id, requested_mu, delivered_mu);
        self.push_raw_record(event_type::BOLUS_DELIVERED, sequence, device_clock, &payload);
    }

    /// Append an arbitrary stream record, for malformed-input tests.
    pub fn push_raw_record(
        &self,
        event_type: u16,
        sequence: u32,
        device_clock: u32,
        payload: &[u8],
    ) {
        let encoded = encode_stream_record(event_type, device_clock, sequence, payload);
        self.inner.lock().history.insert(sequence, encoded);
    }

    pub fn set_iob(&self, milliunits: u32) {
        self.inner.lock().iob_milliunits = milliunits;
    }

    pub fn set_basal_rate(&self, milliunits_per_hour: u32) {
        self.inner.lock().basal_milliunits_per_hour = milliunits_per_hour;
    }

    pub fn set_battery(&self, percent: u8, charging: bool) {
        let mut inner = self.inner.lock();
        inner.battery_percent = percent;
        inner.battery_charging = charging;
    }

    pub fn set_reservoir(&self, centiunits: u16) {
        self.inner.lock().reservoir_centiunits = centiunits;
    }

    /// Make the next `count` invocations of `operation` fail.
    pub fn fail_next(&self, operation: &'static str, count: u32) {
        self.inner.lock().failures.insert(operation, count);
    }

    /// Force the link into a state, as the wireless stack would on a drop.
    pub fn set_connection_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Requests issued so far, in wire order.
    pub fn request_log(&self) -> Vec<&'static str> {
        self.inner.lock().request_log.clone()
    }

    fn begin_request(&self, operation: &'static str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.request_log.push(operation);
        if let Some(remaining) = inner.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("injected {operation} failure"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PumpDriver for MockPumpDriver {
    async fn connect(&self, address: &str) -> Result<ConnectionState> {
        self.begin_request("connect")?;
        self.inner.lock().address = Some(address.to_string());
        self.state_tx.send_replace(ConnectionState::Connecting);
        self.state_tx.send_replace(ConnectionState::Connected);
        Ok(ConnectionState::Connected)
    }

    async fn disconnect(&self) -> Result<()> {
        self.begin_request("disconnect")?;
        self.state_tx.send_replace(ConnectionState::Disconnected);
        Ok(())
    }

    async fn get_iob(&self) -> Result<IobReading> {
        self.begin_request("get_iob")?;
        let frame = {
            let mut inner = self.inner.lock();
            let mut milliunits = inner.iob_milliunits;
            if let Some(rng) = inner.noise.as_mut() {
                let jitter = rng.gen_range(-0.01..=0.01);
                milliunits = ((f64::from(milliunits)) * (1.0 + jitter)) as u32;
            }
            encode_iob_response(milliunits, inner.device_clock)
        };
        decode_iob_response(&frame).ok_or_else(|| anyhow!("device returned implausible IoB frame"))
    }

    async fn get_basal_rate(&self) -> Result<BasalReading> {
        self.begin_request("get_basal_rate")?;
        let frame = {
            let inner = self.inner.lock();
            encode_iob_response(inner.basal_milliunits_per_hour, inner.device_clock)
        };
        decode_basal_rate_response(&frame)
            .ok_or_else(|| anyhow!("device returned implausible basal frame"))
    }

    async fn get_bolus_history(&self, since: DateTime<Utc>) -> Result<Vec<BolusEvent>> {
        self.begin_request("get_bolus_history")?;
        let records: Vec<_> = {
            let inner = self.inner.lock();
            inner
                .history
                .values()
                .filter_map(|bytes| parse_stream_record(bytes))
                .collect()
        };
        Ok(records
            .iter()
            .filter_map(decode_bolus)
            .filter(|event| event.timestamp > since)
            .collect())
    }

    async fn get_battery_status(&self) -> Result<BatteryStatus> {
        self.begin_request("get_battery_status")?;
        let frame = {
            let inner = self.inner.lock();
            encode_battery_response(inner.battery_percent, inner.battery_charging)
        };
        decode_battery_response(&frame)
            .ok_or_else(|| anyhow!("device returned implausible battery frame"))
    }

    async fn get_reservoir_level(&self) -> Result<ReservoirLevel> {
        self.begin_request("get_reservoir_level")?;
        let frame = {
            let inner = self.inner.lock();
            encode_reservoir_response(inner.reservoir_centiunits)
        };
        decode_reservoir_response(&frame)
            .ok_or_else(|| anyhow!("device returned implausible reservoir frame"))
    }

    async fn get_hardware_info(&self) -> Result<HardwareInfo> {
        self.begin_request("get_hardware_info")?;
        let frame = {
            let inner = self.inner.lock();
            encode_hardware_info_response(inner.model_id, inner.firmware, inner.serial)
        };
        decode_hardware_info_response(&frame)
            .ok_or_else(|| anyhow!("device returned malformed hardware-info frame"))
    }

    async fn get_history_logs(&self, since_sequence: u32) -> Result<Vec<u8>> {
        self.begin_request("get_history_logs")?;
        let inner = self.inner.lock();
        let records: Vec<Vec<u8>> = inner
            .history
            .range(since_sequence.saturating_add(1)..)
            .map(|(_, bytes)| bytes.clone())
            .take(MAX_RECORDS_PER_CARGO)
            .collect();
        Ok(encode_cargo(&records))
    }

    fn observe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}
