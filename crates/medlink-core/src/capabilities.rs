//! Plugin capabilities and the pump-driver contract.
//!
//! Capabilities are named roles a plugin can fulfill. They are mutually
//! exclusive per slot: at most one activated plugin may hold a given
//! capability at a time. This is the application-level enforcement of the
//! physical constraint that the short-range wireless link tolerates exactly
//! one active connection per device.
//!
//! # Design
//!
//! The driver contract follows a few rules:
//!
//! - It is async (`#[async_trait]`) and thread-safe (`Send + Sync`).
//! - Every read returns `anyhow::Result`, never panics, so the polling
//!   orchestrator can log-and-continue uniformly.
//! - Connection state is *observed* as a reactive sequence
//!   (`tokio::sync::watch`), not polled.

use crate::data::{
    BasalReading, BatteryStatus, BolusEvent, HardwareInfo, IobReading, ReservoirLevel,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Runtime capability tags declared by plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCapability {
    /// Provides CGM glucose readings.
    GlucoseSource,
    /// Provides insulin delivery telemetry (bolus/basal/IoB).
    InsulinSource,
    /// Provides pump hardware status (battery, reservoir, identity).
    PumpStatus,
}

impl PluginCapability {
    /// Stable string form, used as the key in the persisted
    /// activation-preferences store.
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCapability::GlucoseSource => "glucose_source",
            PluginCapability::InsulinSource => "insulin_source",
            PluginCapability::PumpStatus => "pump_status",
        }
    }

    /// All known capability slots.
    pub fn all() -> &'static [PluginCapability] {
        &[
            PluginCapability::GlucoseSource,
            PluginCapability::InsulinSource,
            PluginCapability::PumpStatus,
        ]
    }
}

impl std::fmt::Display for PluginCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a driver's wireless link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Contract between an activated pump-driver plugin and the polling
/// orchestrator.
///
/// The link tolerates exactly one outstanding request at a time, so callers
/// must issue requests strictly sequentially (the orchestrator enforces a
/// stagger delay between them).
#[async_trait]
pub trait PumpDriver: Send + Sync {
    /// Open the wireless link to the device at `address`.
    async fn connect(&self, address: &str) -> Result<ConnectionState>;

    /// Tear down the wireless link.
    async fn disconnect(&self) -> Result<()>;

    /// Current insulin-on-board.
    async fn get_iob(&self) -> Result<IobReading>;

    /// Currently programmed basal rate.
    async fn get_basal_rate(&self) -> Result<BasalReading>;

    /// Bolus deliveries since `since`.
    async fn get_bolus_history(&self, since: DateTime<Utc>) -> Result<Vec<BolusEvent>>;

    /// Pump battery status.
    async fn get_battery_status(&self) -> Result<BatteryStatus>;

    /// Remaining reservoir volume.
    async fn get_reservoir_level(&self) -> Result<ReservoirLevel>;

    /// Device identity and firmware version.
    async fn get_hardware_info(&self) -> Result<HardwareInfo>;

    /// Raw history-log cargo containing records with sequence numbers
    /// strictly greater than `since_sequence`.
    ///
    /// The payload is the undecoded wire cargo; callers run it through
    /// the telemetry decoder.
    async fn get_history_logs(&self, since_sequence: u32) -> Result<Vec<u8>>;

    /// Reactive view of the link state. Multiple observers may subscribe;
    /// each receiver sees the latest state on subscription.
    fn observe_connection_state(&self) -> watch::Receiver<ConnectionState>;
}
