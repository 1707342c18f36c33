//! Tiered polling state machine over the active pump driver.
//!
//! One watcher task observes the driver's connection state. On `Connected`
//! it launches three independent cadence loops as cancelable tasks; on any
//! other state it cancels all three together and clears alert state.
//! Starting the orchestrator cancels and replaces any previous watcher and
//! loop set, so task sets never accumulate.
//!
//! Within one loop iteration requests execute strictly sequentially with a
//! stagger delay between them: the wireless link tolerates exactly one
//! outstanding request at a time. A failure in one step is logged and the
//! loop proceeds to its next scheduled iteration; across loops no ordering
//! is guaranteed or required, since they poll disjoint data.
//!
//! History polling is incremental: it fetches records strictly after the
//! highest stored sequence number, so a reconnect never re-processes an
//! event even though the loop itself restarts from scratch.

use crate::config::PollingConfig;
use crate::downstream::{ReadingRepository, SyncQueue};
use chrono::{DateTime, Utc};
use medlink_core::{
    ConnectionState, EventBus, EventKind, PumpDriver, Reading, PLATFORM_SENDER_ID,
};
use medlink_protocol::{decode_bolus_batch, decode_glucose_batch, parse_history_log_stream_cargo};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Alert key raised when the pump battery crosses the configured threshold.
pub const ALERT_PUMP_BATTERY_LOW: &str = "pump_battery_low";
/// Alert key raised when the reservoir crosses the configured threshold.
pub const ALERT_RESERVOIR_LOW: &str = "reservoir_low";

/// The three polling tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fast,
    Medium,
    Slow,
}

#[derive(Default)]
struct Tasks {
    watcher: Option<JoinHandle<()>>,
    loops: Vec<JoinHandle<()>>,
}

impl Tasks {
    fn abort_loops(&mut self) {
        for handle in self.loops.drain(..) {
            handle.abort();
        }
    }

    fn abort_all(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.abort_loops();
    }
}

struct Shared {
    driver: Arc<dyn PumpDriver>,
    repository: Arc<dyn ReadingRepository>,
    sync_queue: Arc<dyn SyncQueue>,
    bus: EventBus,
    config: PollingConfig,
    low_power: AtomicBool,
    ever_connected: AtomicBool,
    tasks: Mutex<Tasks>,
    alerts: Mutex<HashSet<&'static str>>,
    last_success: Mutex<HashMap<Tier, DateTime<Utc>>>,
}

/// Drives the tiered polling loops against one activated driver.
pub struct PollingOrchestrator {
    shared: Arc<Shared>,
}

impl PollingOrchestrator {
    pub fn new(
        driver: Arc<dyn PumpDriver>,
        repository: Arc<dyn ReadingRepository>,
        sync_queue: Arc<dyn SyncQueue>,
        bus: EventBus,
        config: PollingConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                driver,
                repository,
                sync_queue,
                bus,
                config,
                low_power: AtomicBool::new(false),
                ever_connected: AtomicBool::new(false),
                tasks: Mutex::new(Tasks::default()),
                alerts: Mutex::new(HashSet::new()),
                last_success: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start (or restart) the connection watcher. Any previous watcher and
    /// loop set is canceled and replaced; only one watcher observes the
    /// driver at a time.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let mut tasks = self.shared.tasks.lock();
        tasks.abort_all();
        tasks.watcher = Some(tokio::spawn(async move {
            watch_connection(shared).await;
        }));
    }

    /// Cancel the watcher and every polling loop. Cancellation is
    /// cooperative and takes effect at each task's next suspension point.
    pub fn shutdown(&self) {
        self.shared.tasks.lock().abort_all();
        self.shared.alerts.lock().clear();
    }

    /// Toggle the low-power duty cycle. Applies from each loop's next
    /// scheduled sleep.
    pub fn set_low_power(&self, low_power: bool) {
        self.shared.low_power.store(low_power, Ordering::SeqCst);
    }

    pub fn low_power(&self) -> bool {
        self.shared.low_power.load(Ordering::SeqCst)
    }

    /// Alert keys currently raised. Cleared whenever the link leaves
    /// `Connected`.
    pub fn active_alerts(&self) -> Vec<&'static str> {
        let mut alerts: Vec<_> = self.shared.alerts.lock().iter().copied().collect();
        alerts.sort_unstable();
        alerts
    }

    /// Instant of the last successful iteration per tier, for
    /// observability.
    pub fn loop_health(&self) -> HashMap<Tier, DateTime<Utc>> {
        self.shared.last_success.lock().clone()
    }
}

impl Drop for PollingOrchestrator {
    fn drop(&mut self) {
        self.shared.tasks.lock().abort_all();
    }
}

async fn watch_connection(shared: Arc<Shared>) {
    let mut rx = shared.driver.observe_connection_state();
    loop {
        let state = *rx.borrow_and_update();
        info!(state = ?state, "connection state observed");
        shared
            .bus
            .publish(PLATFORM_SENDER_ID, EventKind::ConnectionChanged(state));

        match state {
            ConnectionState::Connected => spawn_loops(&shared),
            _ => {
                let mut tasks = shared.tasks.lock();
                tasks.abort_loops();
                shared.alerts.lock().clear();
            }
        }

        if rx.changed().await.is_err() {
            debug!("driver dropped its connection-state channel, watcher exiting");
            return;
        }
    }
}

fn spawn_loops(shared: &Arc<Shared>) {
    let first_connection = !shared.ever_connected.swap(true, Ordering::SeqCst);
    let settle = shared.config.settle_delay(first_connection);
    info!(
        first_connection,
        settle_ms = settle.as_millis() as u64,
        "link connected, starting polling loops"
    );

    let mut tasks = shared.tasks.lock();
    tasks.abort_loops();
    tasks.loops = vec![
        tokio::spawn(run_tier(Arc::clone(shared), Tier::Fast, settle)),
        tokio::spawn(run_tier(Arc::clone(shared), Tier::Medium, settle)),
        tokio::spawn(run_tier(Arc::clone(shared), Tier::Slow, settle)),
    ];
}

async fn run_tier(shared: Arc<Shared>, tier: Tier, settle: std::time::Duration) {
    tokio::time::sleep(settle).await;
    loop {
        let outcome = match tier {
            Tier::Fast => fast_iteration(&shared).await,
            Tier::Medium => medium_iteration(&shared).await,
            Tier::Slow => slow_iteration(&shared).await,
        };
        if outcome {
            shared.last_success.lock().insert(tier, Utc::now());
        }

        let base = match tier {
            Tier::Fast => shared.config.fast_interval,
            Tier::Medium => shared.config.medium_interval,
            Tier::Slow => shared.config.slow_interval,
        };
        let low_power = shared.low_power.load(Ordering::SeqCst);
        tokio::time::sleep(shared.config.effective_interval(base, low_power)).await;
    }
}

/// Issue one device request with the configured timeout. Failures are
/// logged and mapped to `None`; the owning loop always proceeds.
async fn request<T, F>(shared: &Shared, operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(shared.config.request_timeout, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(operation, error = %e, "poll request failed");
            None
        }
        Err(_) => {
            warn!(operation, "poll request timed out");
            None
        }
    }
}

async fn stagger(shared: &Shared) {
    tokio::time::sleep(shared.config.request_stagger).await;
}

/// Fast tier: IoB and basal rate. Doubles as the link keepalive.
async fn fast_iteration(shared: &Shared) -> bool {
    let mut any_success = false;

    if let Some(iob) = request(shared, "get_iob", shared.driver.get_iob()).await {
        any_success = true;
        if let Err(e) = shared.repository.store_iob(iob).await {
            warn!(error = %e, "failed to store IoB reading");
        }
        if let Err(e) = shared.sync_queue.enqueue(Reading::Iob(iob)).await {
            warn!(error = %e, "failed to enqueue IoB reading");
        }
    }

    stagger(shared).await;

    if let Some(basal) = request(shared, "get_basal_rate", shared.driver.get_basal_rate()).await {
        any_success = true;
        if let Err(e) = shared.repository.store_basal(basal).await {
            warn!(error = %e, "failed to store basal reading");
        }
        if let Err(e) = shared.sync_queue.enqueue(Reading::Basal(basal)).await {
            warn!(error = %e, "failed to enqueue basal reading");
        }
    }

    any_success
}

/// Medium tier: incremental history-log catch-up.
async fn medium_iteration(shared: &Shared) -> bool {
    let since = match shared.repository.latest_sequence().await {
        Ok(sequence) => sequence,
        Err(e) => {
            warn!(error = %e, "failed to read stored sequence, skipping history poll");
            return false;
        }
    };

    let Some(cargo) = request(
        shared,
        "get_history_logs",
        shared.driver.get_history_logs(since),
    )
    .await
    else {
        return false;
    };

    let records = parse_history_log_stream_cargo(&cargo, since);
    if records.is_empty() {
        return true;
    }

    let max_sequence = records.iter().map(|r| r.sequence).max().unwrap_or(since);
    let glucose = decode_glucose_batch(&records);
    let boluses = decode_bolus_batch(&records);
    let stored = glucose.len() + boluses.len();

    // Attempt both stores even when one fails, then hold the watermark
    // back so the failed half is retried next cycle. The repository
    // contract makes the resulting re-delivery of the successful half
    // harmless.
    let mut all_stored = true;
    if let Err(e) = shared.repository.store_glucose(&glucose).await {
        warn!(error = %e, "failed to store glucose batch");
        all_stored = false;
    }
    if let Err(e) = shared.repository.store_boluses(&boluses).await {
        warn!(error = %e, "failed to store bolus batch");
        all_stored = false;
    }
    if !all_stored {
        return false;
    }
    for reading in glucose.into_iter().map(Reading::Glucose) {
        if let Err(e) = shared.sync_queue.enqueue(reading).await {
            warn!(error = %e, "failed to enqueue glucose reading");
        }
    }
    for event in boluses.into_iter().map(Reading::Bolus) {
        if let Err(e) = shared.sync_queue.enqueue(event).await {
            warn!(error = %e, "failed to enqueue bolus event");
        }
    }

    // Only advance the watermark once the batch is stored, so a failed
    // store is retried next cycle.
    if let Err(e) = shared.repository.record_sequence(max_sequence).await {
        warn!(error = %e, "failed to advance sequence watermark");
        return false;
    }

    if stored > 0 {
        shared.bus.publish(
            PLATFORM_SENDER_ID,
            EventKind::ReadingsStored { count: stored },
        );
    }
    true
}

/// Slow tier: battery, reservoir, and hardware identity.
async fn slow_iteration(shared: &Shared) -> bool {
    let mut any_success = false;

    if let Some(battery) = request(
        shared,
        "get_battery_status",
        shared.driver.get_battery_status(),
    )
    .await
    {
        any_success = true;
        update_alert(
            shared,
            ALERT_PUMP_BATTERY_LOW,
            battery.percent <= shared.config.battery_alert_percent && !battery.is_charging,
        );
    }

    stagger(shared).await;

    if let Some(reservoir) = request(
        shared,
        "get_reservoir_level",
        shared.driver.get_reservoir_level(),
    )
    .await
    {
        any_success = true;
        update_alert(
            shared,
            ALERT_RESERVOIR_LOW,
            reservoir.units <= shared.config.reservoir_alert_units,
        );
    }

    stagger(shared).await;

    if let Some(info) = request(
        shared,
        "get_hardware_info",
        shared.driver.get_hardware_info(),
    )
    .await
    {
        any_success = true;
        if let Err(e) = shared.repository.store_hardware_info(info.clone()).await {
            warn!(error = %e, "failed to store hardware info");
        }
        if let Err(e) = shared.sync_queue.enqueue(Reading::Hardware(info)).await {
            warn!(error = %e, "failed to enqueue hardware info");
        }
    }

    any_success
}

fn update_alert(shared: &Shared, key: &'static str, raised: bool) {
    let mut alerts = shared.alerts.lock();
    if raised {
        if alerts.insert(key) {
            warn!(alert = key, "raising device alert");
        }
    } else if alerts.remove(key) {
        info!(alert = key, "clearing device alert");
    }
}
