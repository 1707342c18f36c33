//! Narrow seams to the persistence and backend-sync collaborators.
//!
//! Both layers are out of core scope; the orchestrator only ever talks to
//! them through these traits. The in-memory implementations back the test
//! suite and ephemeral hosts.

use async_trait::async_trait;
use medlink_core::{
    BasalReading, BolusEvent, GlucoseReading, HardwareInfo, IobReading, Reading,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Persistence layer for decoded readings.
///
/// The history watermark only advances after a fully stored batch, so a
/// partially failed cycle re-delivers records already stored by the
/// successful half. Batch stores must be idempotent by sequence number:
/// a record whose sequence is already present is skipped, not duplicated.
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    async fn store_glucose(&self, readings: &[GlucoseReading]) -> anyhow::Result<()>;
    async fn store_boluses(&self, events: &[BolusEvent]) -> anyhow::Result<()>;
    async fn store_basal(&self, reading: BasalReading) -> anyhow::Result<()>;
    async fn store_iob(&self, reading: IobReading) -> anyhow::Result<()>;
    async fn store_hardware_info(&self, info: HardwareInfo) -> anyhow::Result<()>;

    /// Highest history-log sequence number stored so far. Zero when empty.
    async fn latest_sequence(&self) -> anyhow::Result<u32>;

    /// Record a newly observed maximum sequence number. Values at or below
    /// the current maximum are ignored.
    async fn record_sequence(&self, sequence: u32) -> anyhow::Result<()>;
}

/// Enqueues readings for eventual backend upload.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(&self, reading: Reading) -> anyhow::Result<()>;
}

/// In-memory repository.
#[derive(Default)]
pub struct MemoryRepository {
    pub glucose: Mutex<Vec<GlucoseReading>>,
    pub boluses: Mutex<Vec<BolusEvent>>,
    pub basal: Mutex<Vec<BasalReading>>,
    pub iob: Mutex<Vec<IobReading>>,
    pub hardware: Mutex<Vec<HardwareInfo>>,
    max_sequence: AtomicU32,
}

impl MemoryRepository {
    /// Seed the stored maximum sequence, emulating prior history.
    pub fn with_sequence(sequence: u32) -> Self {
        let repo = Self::default();
        repo.max_sequence.store(sequence, Ordering::SeqCst);
        repo
    }
}

#[async_trait]
impl ReadingRepository for MemoryRepository {
    async fn store_glucose(&self, readings: &[GlucoseReading]) -> anyhow::Result<()> {
        let mut stored = self.glucose.lock();
        for reading in readings {
            if !stored.iter().any(|r| r.sequence == reading.sequence) {
                stored.push(*reading);
            }
        }
        Ok(())
    }

    async fn store_boluses(&self, events: &[BolusEvent]) -> anyhow::Result<()> {
        let mut stored = self.boluses.lock();
        for event in events {
            if !stored.iter().any(|e| e.sequence == event.sequence) {
                stored.push(*event);
            }
        }
        Ok(())
    }

    async fn store_basal(&self, reading: BasalReading) -> anyhow::Result<()> {
        self.basal.lock().push(reading);
        Ok(())
    }

    async fn store_iob(&self, reading: IobReading) -> anyhow::Result<()> {
        self.iob.lock().push(reading);
        Ok(())
    }

    async fn store_hardware_info(&self, info: HardwareInfo) -> anyhow::Result<()> {
        self.hardware.lock().push(info);
        Ok(())
    }

    async fn latest_sequence(&self) -> anyhow::Result<u32> {
        Ok(self.max_sequence.load(Ordering::SeqCst))
    }

    async fn record_sequence(&self, sequence: u32) -> anyhow::Result<()> {
        self.max_sequence.fetch_max(sequence, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory sync queue.
#[derive(Default)]
pub struct MemorySyncQueue {
    pub items: Mutex<Vec<Reading>>,
}

#[async_trait]
impl SyncQueue for MemorySyncQueue {
    async fn enqueue(&self, reading: Reading) -> anyhow::Result<()> {
        self.items.lock().push(reading);
        Ok(())
    }
}
