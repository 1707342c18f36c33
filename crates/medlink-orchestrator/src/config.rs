//! Polling cadence configuration.
//!
//! The delay constants here are heuristics tuned against one physical device
//! family, so they are configuration with defaults, not invariants. Loaded
//! from TOML with environment overrides, the same way the rest of the
//! platform loads config.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cadence and timing knobs for the polling orchestrator.
///
/// The three tiers poll disjoint data:
///
/// - **fast**: telemetry that also keeps the wireless link from idling out.
/// - **medium**: event-history catch-up.
/// - **slow**: hardware/battery/reservoir status, which changes rarely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Fast-tier interval (IoB and basal rate; link keepalive).
    #[serde(with = "humantime_serde")]
    pub fast_interval: Duration,

    /// Medium-tier interval (incremental history-log catch-up).
    #[serde(with = "humantime_serde")]
    pub medium_interval: Duration,

    /// Slow-tier interval (battery, reservoir, hardware identity).
    #[serde(with = "humantime_serde")]
    pub slow_interval: Duration,

    /// Settle delay between first connection and the first poll.
    #[serde(with = "humantime_serde")]
    pub first_connect_settle: Duration,

    /// Settle delay after a *re*connection. Shorter than the first-connect
    /// settle: the intent is to backfill missed data quickly, not ease in.
    #[serde(with = "humantime_serde")]
    pub reconnect_settle: Duration,

    /// Fixed delay between consecutive requests within one loop iteration.
    /// Back-to-back requests make the peripheral reject or drop frames.
    #[serde(with = "humantime_serde")]
    pub request_stagger: Duration,

    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Uniform interval multiplier applied when host power is low, trading
    /// freshness for battery life.
    pub low_power_multiplier: f64,

    /// Battery percentage at or below which a pump-battery alert is raised.
    pub battery_alert_percent: u8,

    /// Reservoir volume at or below which a low-reservoir alert is raised.
    pub reservoir_alert_units: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(55),
            medium_interval: Duration::from_secs(5 * 60),
            slow_interval: Duration::from_secs(30 * 60),
            first_connect_settle: Duration::from_secs(8),
            reconnect_settle: Duration::from_secs(2),
            request_stagger: Duration::from_millis(500),
            request_timeout: medlink_core::limits::DEFAULT_REQUEST_TIMEOUT,
            low_power_multiplier: 2.0,
            battery_alert_percent: 20,
            reservoir_alert_units: 15.0,
        }
    }
}

impl PollingConfig {
    /// The interval actually slept on, after the duty-cycle multiplier.
    pub fn effective_interval(&self, base: Duration, low_power: bool) -> Duration {
        if low_power {
            base.mul_f64(self.low_power_multiplier)
        } else {
            base
        }
    }

    /// Settle delay for the given connection generation.
    pub fn settle_delay(&self, first_connection: bool) -> Duration {
        if first_connection {
            self.first_connect_settle
        } else {
            self.reconnect_settle
        }
    }
}

/// Load the polling configuration from a TOML file, with `MEDLINK_POLL_`
/// environment overrides. Missing file or fields fall back to defaults.
pub fn load_polling_config(path: &Path) -> anyhow::Result<PollingConfig> {
    let config = Figment::from(Serialized::defaults(PollingConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDLINK_POLL_"))
        .extract()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn low_power_multiplies_every_interval_uniformly() {
        let config = PollingConfig::default();
        for base in [
            config.fast_interval,
            config.medium_interval,
            config.slow_interval,
        ] {
            assert_eq!(config.effective_interval(base, false), base);
            assert_eq!(
                config.effective_interval(base, true),
                base.mul_f64(config.low_power_multiplier)
            );
        }
    }

    #[test]
    fn reconnect_settle_is_shorter_than_first_connect() {
        let config = PollingConfig::default();
        assert!(config.settle_delay(false) < config.settle_delay(true));
    }

    #[test]
    fn file_overrides_merge_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("polling.toml");
        fs::write(&path, "fast_interval = \"20s\"\nlow_power_multiplier = 3.5\n").unwrap();

        let config = load_polling_config(&path).unwrap();
        assert_eq!(config.fast_interval, Duration::from_secs(20));
        assert!((config.low_power_multiplier - 3.5).abs() < f64::EPSILON);
        assert_eq!(
            config.medium_interval,
            PollingConfig::default().medium_interval
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_polling_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PollingConfig::default());
    }
}
