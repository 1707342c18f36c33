//! Safety limits and shared timing constants.
//!
//! `SafetyLimits` is a read-only snapshot handed to every plugin. It is
//! sourced from a backend-synced configuration collaborator, refreshed on
//! demand by the registry, and republished as an event; plugin code never
//! mutates it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout for a single device request. The orchestrator's per-request
/// timeout config defaults to this value.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Externally configured physiological/dosing bounds.
///
/// These are *alerting* bounds, distinct from the decoder's hard
/// plausibility bounds: a glucose value outside `min..=max` here is still a
/// valid reading, it just warrants an alert. The decoder's bounds reject
/// values that cannot be real at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub min_glucose_mg_dl: u16,
    pub max_glucose_mg_dl: u16,
    pub max_basal_rate_units_per_hour: f64,
    pub max_bolus_dose_units: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            min_glucose_mg_dl: 70,
            max_glucose_mg_dl: 250,
            max_basal_rate_units_per_hour: 3.0,
            max_bolus_dose_units: 10.0,
        }
    }
}

impl SafetyLimits {
    /// Whether a glucose value sits inside the configured comfort band.
    pub fn glucose_in_range(&self, value_mg_dl: u16) -> bool {
        (self.min_glucose_mg_dl..=self.max_glucose_mg_dl).contains(&value_mg_dl)
    }

    /// Whether a basal rate is at or below the configured ceiling.
    pub fn basal_rate_allowed(&self, units_per_hour: f64) -> bool {
        units_per_hour <= self.max_basal_rate_units_per_hour
    }

    /// Whether a bolus dose is at or below the configured ceiling.
    pub fn bolus_dose_allowed(&self, units: f64) -> bool {
        units <= self.max_bolus_dose_units
    }
}

/// Backing store for the safety-limits snapshot.
///
/// The backend-sync layer that keeps the store fresh is out of core scope;
/// the registry only ever re-reads through this seam.
pub trait SafetyLimitsSource: Send + Sync {
    fn load(&self) -> anyhow::Result<SafetyLimits>;
}

/// Fixed in-memory source, used in tests and as a fallback.
#[derive(Debug, Clone, Default)]
pub struct StaticLimitsSource(pub SafetyLimits);

impl SafetyLimitsSource for StaticLimitsSource {
    fn load(&self) -> anyhow::Result<SafetyLimits> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfort_band_is_inclusive() {
        let limits = SafetyLimits::default();
        assert!(limits.glucose_in_range(70));
        assert!(limits.glucose_in_range(250));
        assert!(!limits.glucose_in_range(69));
        assert!(!limits.glucose_in_range(251));
    }

    #[test]
    fn dosing_ceilings() {
        let limits = SafetyLimits::default();
        assert!(limits.basal_rate_allowed(3.0));
        assert!(!limits.basal_rate_allowed(3.1));
        assert!(limits.bolus_dose_allowed(10.0));
        assert!(!limits.bolus_dose_allowed(10.5));
    }
}
