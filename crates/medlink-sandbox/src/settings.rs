//! Plugin-scoped settings storage.
//!
//! Same namespacing scheme as the credential store, but for non-secret
//! configuration values a plugin wants to persist between runs.

use crate::credentials::sanitize_plugin_id;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON-file-backed key/value settings for one plugin namespace.
pub struct SettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl SettingsStore {
    pub fn open(root: &Path, plugin_id: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(root)?;
        let path = root.join(format!("{}.settings.json", sanitize_plugin_id(plugin_id)));
        let values = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        values.insert(key.into(), value);
        self.persist(&values)
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        values.remove(key);
        self.persist(&values)
    }

    fn persist(&self, values: &BTreeMap<String, serde_json::Value>) -> anyhow::Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn settings_roundtrip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path(), "acme.pump").unwrap();
        store.set("poll_address", json!("00:11:22:33:44:55")).unwrap();
        store.set("retries", json!(3)).unwrap();
        store.remove("retries").unwrap();

        let reopened = SettingsStore::open(dir.path(), "acme.pump").unwrap();
        assert_eq!(
            reopened.get("poll_address"),
            Some(json!("00:11:22:33:44:55"))
        );
        assert_eq!(reopened.get("retries"), None);
    }
}
