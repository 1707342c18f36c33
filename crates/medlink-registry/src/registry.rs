//! Capability-based plugin registry.
//!
//! The registry owns every plugin instance for its activation lifetime. Its
//! rules, in order of importance:
//!
//! - **One driver per capability.** At most one activated plugin may hold a
//!   given capability slot. Activating a plugin whose capability is already
//!   held evicts the prior holder first (deactivation hook invoked exactly
//!   once, slot state cleared): last-activated wins, never silent
//!   coexistence. This is the application-level enforcement of the physical
//!   constraint that the wireless link admits one active connection.
//! - **Closed factory set, exact API version.** Factories are registered at
//!   the composition root; `initialize()` instantiates only factories whose
//!   declared API version matches [`PLUGIN_API_VERSION`] exactly. Mismatches
//!   are silently excluded, since they may be future-compiled modules.
//! - **One-time initialization.** `initialize()` twice is a host programming
//!   error and fails with an invalid-state error: plugin instances are not
//!   re-creatable once the host context is handed to them.
//!
//! All mutable state sits behind a single coarse lock; contention is low and
//! correctness (no double-start, no leaked slots) matters more than
//! parallelism here. Every transition is broadcast on the event bus so the
//! rest of the system reacts without polling.

use crate::prefs::ActivationStore;
use futures::future::BoxFuture;
use medlink_core::{
    AppResult, EventBus, EventKind, MedlinkError, Plugin, PluginCapability, PluginMetadata,
    SafetyLimits, SafetyLimitsSource, PLATFORM_SENDER_ID, PLUGIN_API_VERSION,
};
use medlink_sandbox::SandboxedContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Builds plugin instances against the versioned plugin API.
///
/// Factories are plain objects resolved at build/link time and registered
/// explicitly; capability discovery never relies on ambient reflection.
pub trait PluginFactory: Send + Sync {
    /// Identity and declared API version, available before instantiation.
    fn metadata(&self) -> PluginMetadata;

    /// Capability slots the built plugin will declare.
    fn capabilities(&self) -> &[PluginCapability];

    /// Instantiate the plugin against its restricted host surface.
    fn build(
        &self,
        context: Arc<SandboxedContext>,
    ) -> BoxFuture<'static, anyhow::Result<Arc<dyn Plugin>>>;
}

struct Inner {
    initialized: bool,
    factories: Vec<Box<dyn PluginFactory>>,
    plugins: HashMap<String, Arc<dyn Plugin>>,
    store: Box<dyn ActivationStore>,
}

/// Central registry for plugin discovery, activation, and safety limits.
pub struct PluginRegistry {
    inner: Mutex<Inner>,
    /// Serializes evict-then-activate sequences: the lifecycle hooks run
    /// outside `inner`'s lock, so without this two concurrent activations
    /// sharing a capability could both evict the same prior holder.
    lifecycle: tokio::sync::Mutex<()>,
    bus: EventBus,
    limits_source: Arc<dyn SafetyLimitsSource>,
    limits_tx: watch::Sender<SafetyLimits>,
    storage_root: PathBuf,
}

impl PluginRegistry {
    pub fn new(
        bus: EventBus,
        limits_source: Arc<dyn SafetyLimitsSource>,
        store: Box<dyn ActivationStore>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        let initial = limits_source.load().unwrap_or_default();
        let (limits_tx, _) = watch::channel(initial);
        Self {
            inner: Mutex::new(Inner {
                initialized: false,
                factories: Vec::new(),
                plugins: HashMap::new(),
                store,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            bus,
            limits_source,
            limits_tx,
            storage_root: storage_root.into(),
        }
    }

    /// Register a plugin factory. Only valid before [`initialize`].
    ///
    /// [`initialize`]: PluginRegistry::initialize
    pub fn register_factory(&self, factory: Box<dyn PluginFactory>) -> AppResult<()> {
        let mut inner = self.inner.lock();
        if inner.initialized {
            return Err(MedlinkError::invalid_state(
                "cannot register factories after the registry is initialized",
            ));
        }
        inner.factories.push(factory);
        Ok(())
    }

    /// One-time discovery pass: instantiate every registered factory whose
    /// declared API version matches the host exactly, then run each
    /// plugin's initialize hook.
    ///
    /// Calling this twice fails with an invalid-state error.
    pub async fn initialize(&self) -> AppResult<()> {
        let factories = {
            let mut inner = self.inner.lock();
            if inner.initialized {
                return Err(MedlinkError::invalid_state(
                    "plugin registry is already initialized",
                ));
            }
            inner.initialized = true;
            std::mem::take(&mut inner.factories)
        };

        let mut built: Vec<(String, Arc<dyn Plugin>)> = Vec::new();
        for factory in &factories {
            let metadata = factory.metadata();
            if metadata.api_version != PLUGIN_API_VERSION {
                // possibly a future-compiled module; exclude without fanfare
                debug!(
                    plugin = %metadata.id,
                    declared = metadata.api_version,
                    host = PLUGIN_API_VERSION,
                    "excluding plugin with mismatched API version"
                );
                continue;
            }

            let context = match SandboxedContext::new(
                &metadata.id,
                &self.storage_root,
                self.bus.clone(),
                self.limits_tx.subscribe(),
            ) {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(plugin = %metadata.id, error = %e, "failed to build sandbox, excluding plugin");
                    continue;
                }
            };

            match factory.build(context).await {
                Ok(plugin) => match plugin.initialize().await {
                    Ok(()) => {
                        info!(plugin = %metadata.id, version = %metadata.version, "loaded plugin");
                        built.push((metadata.id, plugin));
                    }
                    Err(e) => {
                        warn!(plugin = %metadata.id, error = %e, "plugin initialize hook failed, excluding")
                    }
                },
                Err(e) => warn!(plugin = %metadata.id, error = %e, "plugin factory build failed, excluding"),
            }
        }

        let mut inner = self.inner.lock();
        for (id, plugin) in built {
            inner.plugins.insert(id, plugin);
        }
        Ok(())
    }

    /// Metadata of every loaded, API-compatible plugin.
    pub fn available_plugins(&self) -> Vec<PluginMetadata> {
        let inner = self.inner.lock();
        let mut all: Vec<_> = inner
            .plugins
            .values()
            .map(|p| p.metadata().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Look up a loaded plugin by id.
    pub fn get_plugin(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.lock().plugins.get(id).cloned()
    }

    /// Plugin id currently holding `capability`, if any.
    pub fn active_plugin(&self, capability: PluginCapability) -> Option<String> {
        self.inner.lock().store.active_plugin(capability)
    }

    /// Activate a plugin, evicting any prior holder of each capability it
    /// declares. Last-activated wins.
    pub async fn activate_plugin(&self, id: &str) -> AppResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let plugin = self
            .get_plugin(id)
            .ok_or_else(|| MedlinkError::UnknownPlugin(id.to_string()))?;

        // Collect prior holders first; a plugin holding several of the
        // requested capabilities is evicted exactly once.
        let evicted_ids: Vec<String> = {
            let inner = self.inner.lock();
            let mut ids = Vec::new();
            for capability in plugin.capabilities() {
                if let Some(holder) = inner.store.active_plugin(*capability) {
                    if holder != id && !ids.contains(&holder) {
                        ids.push(holder);
                    }
                }
            }
            ids
        };

        for evicted in &evicted_ids {
            self.evict(evicted).await?;
        }

        plugin
            .activate()
            .await
            .map_err(|e| MedlinkError::Activation {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        {
            let mut inner = self.inner.lock();
            for capability in plugin.capabilities() {
                inner
                    .store
                    .set_active(*capability, id)
                    .map_err(|e| MedlinkError::Store(e.to_string()))?;
            }
        }

        info!(plugin = %id, "activated plugin");
        self.bus.publish(
            PLATFORM_SENDER_ID,
            EventKind::PluginActivated {
                plugin_id: id.to_string(),
            },
        );
        Ok(())
    }

    /// Deactivate a plugin and clear every capability slot it held.
    pub async fn deactivate_plugin(&self, id: &str) -> AppResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.get_plugin(id).is_none() {
            return Err(MedlinkError::UnknownPlugin(id.to_string()));
        }
        self.evict(id).await
    }

    /// Run the deactivation hook for `id` (if loaded), clear its slots and
    /// its persisted activation record, and publish the transition.
    async fn evict(&self, id: &str) -> AppResult<()> {
        if let Some(plugin) = self.get_plugin(id) {
            if let Err(e) = plugin.deactivate().await {
                // the eviction is mandatory either way; the slot must not
                // stay held by a half-dead plugin
                warn!(plugin = %id, error = %e, "deactivation hook failed");
            }
        }

        {
            let mut inner = self.inner.lock();
            inner
                .store
                .clear_plugin(id)
                .map_err(|e| MedlinkError::Store(e.to_string()))?;
        }

        info!(plugin = %id, "deactivated plugin");
        self.bus.publish(
            PLATFORM_SENDER_ID,
            EventKind::PluginDeactivated {
                plugin_id: id.to_string(),
            },
        );
        Ok(())
    }

    /// Re-read the safety-limits snapshot, republish it on the reactive
    /// value, and broadcast the change tagged with the platform sender id.
    pub fn refresh_safety_limits(&self) -> AppResult<SafetyLimits> {
        let limits = self
            .limits_source
            .load()
            .map_err(|e| MedlinkError::SafetyLimits(e.to_string()))?;
        self.limits_tx.send_replace(limits);
        self.bus
            .publish(PLATFORM_SENDER_ID, EventKind::SafetyLimitsChanged(limits));
        Ok(limits)
    }

    /// Read-only reactive safety-limits value.
    pub fn safety_limits(&self) -> watch::Receiver<SafetyLimits> {
        self.limits_tx.subscribe()
    }

    /// Shared event bus handle.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}
