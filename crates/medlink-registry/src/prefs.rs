//! Persisted activation preferences.
//!
//! The registry records which plugin currently holds each capability slot so
//! that activations survive a host restart and the mutual-exclusion check
//! has a durable source of truth.

use medlink_core::PluginCapability;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Capability-indexed record of active plugin ids.
pub trait ActivationStore: Send + Sync {
    /// Plugin id currently holding `capability`, if any.
    fn active_plugin(&self, capability: PluginCapability) -> Option<String>;

    /// Record `plugin_id` as the holder of `capability`.
    fn set_active(&mut self, capability: PluginCapability, plugin_id: &str) -> anyhow::Result<()>;

    /// Clear every slot held by `plugin_id`.
    fn clear_plugin(&mut self, plugin_id: &str) -> anyhow::Result<()>;
}

/// In-memory store for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryActivationStore {
    slots: BTreeMap<PluginCapability, String>,
}

impl ActivationStore for MemoryActivationStore {
    fn active_plugin(&self, capability: PluginCapability) -> Option<String> {
        self.slots.get(&capability).cloned()
    }

    fn set_active(&mut self, capability: PluginCapability, plugin_id: &str) -> anyhow::Result<()> {
        self.slots.insert(capability, plugin_id.to_string());
        Ok(())
    }

    fn clear_plugin(&mut self, plugin_id: &str) -> anyhow::Result<()> {
        self.slots.retain(|_, holder| holder != plugin_id);
        Ok(())
    }
}

/// JSON-file-backed store, keyed by the capability's stable string form.
pub struct FileActivationStore {
    path: PathBuf,
    slots: BTreeMap<String, String>,
}

impl FileActivationStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let slots = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, slots })
    }

    fn persist(&self) -> anyhow::Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(&self.slots)?)?;
        Ok(())
    }
}

impl ActivationStore for FileActivationStore {
    fn active_plugin(&self, capability: PluginCapability) -> Option<String> {
        self.slots.get(capability.as_str()).cloned()
    }

    fn set_active(&mut self, capability: PluginCapability, plugin_id: &str) -> anyhow::Result<()> {
        self.slots
            .insert(capability.as_str().to_string(), plugin_id.to_string());
        self.persist()
    }

    fn clear_plugin(&mut self, plugin_id: &str) -> anyhow::Result<()> {
        self.slots.retain(|_, holder| holder != plugin_id);
        self.persist()
    }
}
