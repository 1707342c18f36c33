//! TOML-backed safety-limits source.
//!
//! The backend-sync layer writes the snapshot file; this source only ever
//! re-reads it when the registry's `refresh_safety_limits` is called.

use figment::{
    providers::{Format, Toml},
    Figment,
};
use medlink_core::{SafetyLimits, SafetyLimitsSource};
use std::path::PathBuf;

/// Loads the [`SafetyLimits`] snapshot from a TOML file, with environment
/// overrides under the `MEDLINK_LIMITS_` prefix.
pub struct TomlLimitsSource {
    path: PathBuf,
}

impl TomlLimitsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SafetyLimitsSource for TomlLimitsSource {
    fn load(&self) -> anyhow::Result<SafetyLimits> {
        let limits = Figment::from(figment::providers::Serialized::defaults(
            SafetyLimits::default(),
        ))
        .merge(Toml::file(&self.path))
        .merge(figment::providers::Env::prefixed("MEDLINK_LIMITS_"))
        .extract()?;
        Ok(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let source = TomlLimitsSource::new(dir.path().join("limits.toml"));
        assert_eq!(source.load().unwrap(), SafetyLimits::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("limits.toml");
        fs::write(
            &path,
            "min_glucose_mg_dl = 80\nmax_bolus_dose_units = 6.0\n",
        )
        .unwrap();

        let limits = TomlLimitsSource::new(&path).load().unwrap();
        assert_eq!(limits.min_glucose_mg_dl, 80);
        assert!((limits.max_bolus_dose_units - 6.0).abs() < f64::EPSILON);
        // untouched fields keep their defaults
        assert_eq!(
            limits.max_glucose_mg_dl,
            SafetyLimits::default().max_glucose_mg_dl
        );
    }
}
