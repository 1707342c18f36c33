//! Device polling orchestrator.
//!
//! Watches the active driver's connection state and runs three cancelable
//! polling loops (fast/medium/slow cadence) against the single shared
//! wireless link, feeding decoded records to the persistence and sync
//! collaborators.

pub mod config;
pub mod downstream;
pub mod orchestrator;

pub use config::{load_polling_config, PollingConfig};
pub use downstream::{MemoryRepository, MemorySyncQueue, ReadingRepository, SyncQueue};
pub use orchestrator::{
    PollingOrchestrator, Tier, ALERT_PUMP_BATTERY_LOW, ALERT_RESERVOIR_LOW,
};
