//! End-to-end polling tests against the mock pump driver.
//!
//! Intervals are shrunk to milliseconds so each test completes quickly;
//! assertions wait on observable state rather than exact tick counts.

use medlink_core::{EventBus, EventKind, PumpDriver, Reading};
use medlink_driver_mock::MockPumpDriver;
use medlink_orchestrator::{
    MemoryRepository, MemorySyncQueue, PollingConfig, PollingOrchestrator,
    ALERT_PUMP_BATTERY_LOW, ALERT_RESERVOIR_LOW,
};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> PollingConfig {
    PollingConfig {
        fast_interval: Duration::from_millis(10),
        medium_interval: Duration::from_millis(10),
        slow_interval: Duration::from_millis(10),
        first_connect_settle: Duration::from_millis(2),
        reconnect_settle: Duration::from_millis(1),
        request_stagger: Duration::from_millis(1),
        request_timeout: Duration::from_secs(1),
        low_power_multiplier: 2.0,
        battery_alert_percent: 20,
        reservoir_alert_units: 15.0,
    }
}

struct Fixture {
    driver: Arc<MockPumpDriver>,
    repository: Arc<MemoryRepository>,
    sync_queue: Arc<MemorySyncQueue>,
    bus: EventBus,
    orchestrator: PollingOrchestrator,
}

fn fixture() -> Fixture {
    let driver = Arc::new(MockPumpDriver::new());
    let repository = Arc::new(MemoryRepository::default());
    let sync_queue = Arc::new(MemorySyncQueue::default());
    let bus = EventBus::default();
    let orchestrator = PollingOrchestrator::new(
        Arc::clone(&driver) as Arc<dyn PumpDriver>,
        Arc::clone(&repository) as _,
        Arc::clone(&sync_queue) as _,
        bus.clone(),
        test_config(),
    );
    Fixture {
        driver,
        repository,
        sync_queue,
        bus,
        orchestrator,
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {description}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn loops_start_on_connect_and_poll_all_tiers() {
    let fx = fixture();
    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("fast tier stores IoB and basal", || {
        !repo.iob.lock().is_empty() && !repo.basal.lock().is_empty()
    })
    .await;
    let repo = Arc::clone(&fx.repository);
    wait_until("slow tier stores hardware info", || {
        !repo.hardware.lock().is_empty()
    })
    .await;

    let items = fx.sync_queue.items.lock();
    assert!(items.iter().any(|r| matches!(r, Reading::Iob(_))));
    assert!(items.iter().any(|r| matches!(r, Reading::Basal(_))));
    assert!(items.iter().any(|r| matches!(r, Reading::Hardware(_))));
    drop(items);

    let orch = &fx.orchestrator;
    wait_until("all three tiers report a success", || {
        orch.loop_health().len() == 3
    })
    .await;
}

#[tokio::test]
async fn history_catch_up_decodes_and_stores_new_records() {
    let fx = fixture();
    let mut events = fx.bus.subscribe();

    fx.driver.push_cgm_record(1, 100_000, 120);
    fx.driver.push_cgm_record(2, 100_300, 125);
    fx.driver.push_bolus_record(3, 100_600, 7, 2_500, 2_500);

    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("history batch lands in the repository", || {
        repo.glucose.lock().len() == 2 && repo.boluses.lock().len() == 1
    })
    .await;

    let glucose = fx.repository.glucose.lock().clone();
    assert_eq!(glucose[0].value_mg_dl, 120);
    assert_eq!(glucose[1].value_mg_dl, 125);
    let bolus = fx.repository.boluses.lock()[0];
    assert_eq!(bolus.bolus_id, 7);
    assert!((bolus.delivered_units - 2.5).abs() < f64::EPSILON);

    // The batch is announced once stored.
    let stored = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event bus went quiet")
            .unwrap();
        if let EventKind::ReadingsStored { count } = event.kind {
            break count;
        }
    };
    assert_eq!(stored, 3);
}

#[tokio::test]
async fn reconnect_never_reprocesses_stored_history() {
    let fx = fixture();
    fx.driver.push_cgm_record(1, 100_000, 110);
    fx.driver.push_cgm_record(2, 100_300, 112);

    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("initial history stored", || repo.glucose.lock().len() == 2).await;

    fx.driver.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // New record appears while disconnected.
    fx.driver.push_cgm_record(3, 100_600, 115);
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("backfill record stored", || repo.glucose.lock().len() == 3).await;

    // Loops restarted from scratch, yet sequences 1 and 2 were not re-read.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sequences: Vec<u32> = fx.repository.glucose.lock().iter().map(|g| g.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn loops_stop_when_link_drops() {
    let fx = fixture();
    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("polling underway", || !repo.iob.lock().is_empty()).await;

    fx.driver.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let settled = fx.driver.request_log().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        fx.driver.request_log().len(),
        settled,
        "no requests issued after disconnect"
    );
}

#[tokio::test]
async fn failed_request_is_retried_next_cycle() {
    let fx = fixture();
    fx.driver.fail_next("get_iob", 2);

    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    // Both injected failures are consumed, then the loop recovers.
    let repo = Arc::clone(&fx.repository);
    wait_until("IoB stored after failures", || !repo.iob.lock().is_empty()).await;

    let attempts = fx
        .driver
        .request_log()
        .iter()
        .filter(|op| **op == "get_iob")
        .count();
    assert!(attempts >= 3, "loop kept retrying, saw {attempts} attempts");

    // Basal polling was unaffected by the IoB failures.
    let repo = Arc::clone(&fx.repository);
    wait_until("basal stored alongside", || !repo.basal.lock().is_empty()).await;
}

/// Repository whose bolus store fails a scripted number of times, for
/// partial-failure recovery tests.
struct FlakyRepository {
    inner: MemoryRepository,
    bolus_failures: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl medlink_orchestrator::ReadingRepository for FlakyRepository {
    async fn store_glucose(
        &self,
        readings: &[medlink_core::GlucoseReading],
    ) -> anyhow::Result<()> {
        self.inner.store_glucose(readings).await
    }

    async fn store_boluses(&self, events: &[medlink_core::BolusEvent]) -> anyhow::Result<()> {
        use std::sync::atomic::Ordering;
        let remaining = self.bolus_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.bolus_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("bolus table unavailable");
        }
        self.inner.store_boluses(events).await
    }

    async fn store_basal(&self, reading: medlink_core::BasalReading) -> anyhow::Result<()> {
        self.inner.store_basal(reading).await
    }

    async fn store_iob(&self, reading: medlink_core::IobReading) -> anyhow::Result<()> {
        self.inner.store_iob(reading).await
    }

    async fn store_hardware_info(&self, info: medlink_core::HardwareInfo) -> anyhow::Result<()> {
        self.inner.store_hardware_info(info).await
    }

    async fn latest_sequence(&self) -> anyhow::Result<u32> {
        self.inner.latest_sequence().await
    }

    async fn record_sequence(&self, sequence: u32) -> anyhow::Result<()> {
        self.inner.record_sequence(sequence).await
    }
}

#[tokio::test]
async fn partial_store_failure_retries_without_duplicating_readings() {
    let driver = Arc::new(MockPumpDriver::new());
    let repository = Arc::new(FlakyRepository {
        inner: MemoryRepository::default(),
        bolus_failures: std::sync::atomic::AtomicU32::new(1),
    });
    let sync_queue = Arc::new(MemorySyncQueue::default());
    let orchestrator = PollingOrchestrator::new(
        Arc::clone(&driver) as Arc<dyn PumpDriver>,
        Arc::clone(&repository) as _,
        Arc::clone(&sync_queue) as _,
        EventBus::default(),
        test_config(),
    );

    driver.push_cgm_record(1, 100_000, 118);
    driver.push_bolus_record(2, 100_300, 7, 3_000, 3_000);

    orchestrator.start();
    driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    // The first history cycle stores glucose but fails the bolus store, so
    // the watermark stays put and the batch is re-fetched.
    let repo = Arc::clone(&repository);
    wait_until("bolus lands after the failed cycle", || {
        repo.inner.boluses.lock().len() == 1
    })
    .await;

    // The re-delivered glucose reading was skipped, not stored again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sequences: Vec<u32> = repository
        .inner
        .glucose
        .lock()
        .iter()
        .map(|g| g.sequence)
        .collect();
    assert_eq!(sequences, vec![1]);
    assert_eq!(repository.inner.boluses.lock().len(), 1);
}

#[tokio::test]
async fn low_battery_and_reservoir_raise_alerts() {
    let fx = fixture();
    fx.driver.set_battery(10, false);
    fx.driver.set_reservoir(500); // 5.0 units

    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let orch = &fx.orchestrator;
    wait_until("both alerts raised", || {
        orch.active_alerts() == vec![ALERT_PUMP_BATTERY_LOW, ALERT_RESERVOIR_LOW]
    })
    .await;

    // Recovery clears them on a later slow-tier pass.
    fx.driver.set_battery(80, false);
    fx.driver.set_reservoir(20_000);
    wait_until("alerts cleared after recovery", || {
        orch.active_alerts().is_empty()
    })
    .await;
}

#[tokio::test]
async fn charging_battery_never_alerts() {
    let fx = fixture();
    fx.driver.set_battery(5, true);

    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("slow tier ran", || !repo.hardware.lock().is_empty()).await;
    assert!(!fx
        .orchestrator
        .active_alerts()
        .contains(&ALERT_PUMP_BATTERY_LOW));
}

#[tokio::test]
async fn restart_replaces_the_previous_watcher() {
    let fx = fixture();
    fx.orchestrator.start();
    fx.orchestrator.start();
    fx.driver.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

    let repo = Arc::clone(&fx.repository);
    wait_until("polling works after restart", || !repo.iob.lock().is_empty()).await;

    fx.orchestrator.shutdown();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let settled = fx.driver.request_log().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.driver.request_log().len(), settled);
}

#[tokio::test]
async fn low_power_flag_round_trips() {
    let fx = fixture();
    assert!(!fx.orchestrator.low_power());
    fx.orchestrator.set_low_power(true);
    assert!(fx.orchestrator.low_power());
    fx.orchestrator.set_low_power(false);
    assert!(!fx.orchestrator.low_power());
}
