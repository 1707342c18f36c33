//! Plugin metadata and lifecycle contract.
//!
//! Plugins are resolved from a closed registry of factory objects registered
//! at the composition root; capability discovery never relies on ambient
//! reflection. Anything loaded at runtime goes through the narrow, versioned
//! manifest contract in `medlink-registry`.

use crate::capabilities::{PluginCapability, PumpDriver};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API version the host was compiled against.
///
/// The registry instantiates a plugin factory only on an *exact* match;
/// mismatched versions are silently excluded from the available set, since
/// they may be future-compiled modules.
pub const PLUGIN_API_VERSION: u32 = 3;

/// Immutable identity of a plugin, fixed once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Stable string identifier, e.g. `"acme.pump-x2"`.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Declared API version; must equal [`PLUGIN_API_VERSION`] exactly.
    pub api_version: u32,
}

/// An instantiated device-driver plugin.
///
/// Owned exclusively by the registry for its activation lifetime. The
/// lifecycle is: `initialize` once after construction, then any number of
/// `activate`/`deactivate` pairs; `deactivate` runs when the plugin is
/// superseded by another holder of one of its capabilities or explicitly
/// removed.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Capabilities this plugin declares. Each is an exclusive slot.
    fn capabilities(&self) -> &[PluginCapability];

    /// One-time setup after construction, before any activation.
    async fn initialize(&self) -> Result<()>;

    /// Called when this plugin becomes the active holder of its capabilities.
    async fn activate(&self) -> Result<()>;

    /// Called when this plugin is evicted or explicitly deactivated.
    async fn deactivate(&self) -> Result<()>;

    /// The driver instance the orchestrator polls, if this plugin provides
    /// one. Returns `None` for plugins that only publish derived data.
    fn pump_driver(&self) -> Option<Arc<dyn PumpDriver>>;
}
