//! Core types and traits for the medlink device-plugin runtime.
//!
//! This crate is the leaf of the workspace: it defines the data model,
//! capability and driver contracts, the event bus, and the error taxonomy
//! shared by the sandbox, registry, and orchestrator crates. It performs no
//! I/O of its own.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  medlink-registry          medlink-orchestrator          │
//! │  (factories, activation)   (connection watcher, loops)   │
//! ├──────────────────────────────────────────────────────────┤
//! │  medlink-sandbox           medlink-protocol              │
//! │  (restricted host surface) (wire record decoding)        │
//! ├──────────────────────────────────────────────────────────┤
//! │                     medlink-core                         │
//! │   Plugin | PumpDriver | PluginCapability | EventBus      │
//! │   SafetyLimits | decoded reading value objects           │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod capabilities;
pub mod data;
pub mod error;
pub mod events;
pub mod limits;
pub mod plugin;

pub use capabilities::{ConnectionState, PluginCapability, PumpDriver};
pub use data::{
    BasalReading, BatteryStatus, BolusEvent, GlucoseReading, HardwareInfo, HistoryLogRecord,
    IobReading, Reading, ReservoirLevel,
};
pub use error::{AppResult, MedlinkError};
pub use events::{EventBus, EventKind, MedlinkEvent, PLATFORM_SENDER_ID};
pub use limits::{SafetyLimits, SafetyLimitsSource, StaticLimitsSource};
pub use plugin::{Plugin, PluginMetadata, PLUGIN_API_VERSION};
