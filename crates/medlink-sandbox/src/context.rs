//! The restricted execution context handed to plugin code.
//!
//! Plugins may be built by third parties against the published interface and
//! loaded dynamically, so they never receive full host access. Instead of a
//! large unrestricted base with selected methods overridden, every entry
//! point consults an explicit allow/deny table:
//!
//! - Host operations on the blocked list fail immediately with a security
//!   violation naming the specific operation attempted, never a generic
//!   "denied".
//! - System services are granted from a closed allowlist checked by exact
//!   membership, not prefix or pattern match. Anything off the list fails by
//!   the same rule.
//! - `application_context()` returns the restricted context itself, which
//!   closes the escape-via-context-chaining route.

use crate::credentials::CredentialStore;
use crate::settings::SettingsStore;
use medlink_core::{EventBus, EventKind, SafetyLimits};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

/// Host operations a sandboxed plugin is never allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockedOperation {
    StartActivity,
    StartService,
    StartForegroundService,
    SendBroadcast,
    BindService,
    RegisterReceiver,
    ContentResolver,
    BaseContext,
    CreatePackageContext,
    OpenFile,
    DeleteFile,
    OpenDatabase,
    DeleteDatabase,
    DatabasePath,
    DeviceProtectedStorage,
}

impl BlockedOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedOperation::StartActivity => "start_activity",
            BlockedOperation::StartService => "start_service",
            BlockedOperation::StartForegroundService => "start_foreground_service",
            BlockedOperation::SendBroadcast => "send_broadcast",
            BlockedOperation::BindService => "bind_service",
            BlockedOperation::RegisterReceiver => "register_receiver",
            BlockedOperation::ContentResolver => "content_resolver",
            BlockedOperation::BaseContext => "base_context",
            BlockedOperation::CreatePackageContext => "create_package_context",
            BlockedOperation::OpenFile => "open_file",
            BlockedOperation::DeleteFile => "delete_file",
            BlockedOperation::OpenDatabase => "open_database",
            BlockedOperation::DeleteDatabase => "delete_database",
            BlockedOperation::DatabasePath => "database_path",
            BlockedOperation::DeviceProtectedStorage => "device_protected_storage",
        }
    }
}

impl std::fmt::Display for BlockedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host system services a plugin may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemService {
    /// Short-range wireless scanning and connection.
    Bluetooth,
    /// Required by the platform for wireless scanning.
    Location,
    /// Host power-state queries (battery level, low-power mode).
    Power,
    Wifi,
    Telephony,
    Camera,
    Clipboard,
    Notification,
}

impl SystemService {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemService::Bluetooth => "bluetooth",
            SystemService::Location => "location",
            SystemService::Power => "power",
            SystemService::Wifi => "wifi",
            SystemService::Telephony => "telephony",
            SystemService::Camera => "camera",
            SystemService::Clipboard => "clipboard",
            SystemService::Notification => "notification",
        }
    }
}

impl std::fmt::Display for SystemService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed allowlist: hardware-proximate services needed for wireless
/// scanning/connection and power-state queries. Exact membership only.
pub const ALLOWED_SERVICES: &[SystemService] = &[
    SystemService::Bluetooth,
    SystemService::Location,
    SystemService::Power,
];

/// Sandbox boundary violations. Always fatal to the attempted call, never
/// silently degraded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("security violation: plugin attempted blocked operation '{0}'")]
    BlockedOperation(BlockedOperation),

    #[error("security violation: system service '{0}' is not on the sandbox allowlist")]
    ServiceNotAllowed(SystemService),
}

/// Opaque grant for an allowlisted system service.
///
/// Only the sandbox constructs these; the host wires the actual transport
/// (e.g. the bluetooth adapter) to the grant out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceGrant {
    kind: SystemService,
}

impl ServiceGrant {
    pub fn kind(&self) -> SystemService {
        self.kind
    }
}

/// Event-bus handle scoped to one plugin: everything published through it is
/// tagged with that plugin's id, so subscribers can always attribute events.
#[derive(Debug, Clone)]
pub struct ScopedEventBus {
    bus: EventBus,
    sender_id: String,
}

impl ScopedEventBus {
    pub fn publish(&self, kind: EventKind) {
        self.bus.publish(self.sender_id.clone(), kind);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<medlink_core::MedlinkEvent> {
        self.bus.subscribe()
    }
}

/// The restricted view of host capabilities handed to plugin code.
///
/// Exposes only: a read-only reactive [`SafetyLimits`] value, a debug
/// logger, a publish/subscribe event-bus handle, a namespaced credential
/// store, and a plugin-scoped settings store. None of these let a plugin
/// reach another plugin's data or the platform's unrestricted storage.
pub struct SandboxedContext {
    plugin_id: String,
    limits: watch::Receiver<SafetyLimits>,
    events: ScopedEventBus,
    credentials: CredentialStore,
    settings: SettingsStore,
}

impl SandboxedContext {
    /// Build the restricted surface for one plugin.
    ///
    /// `storage_root` is the platform-owned directory under which the
    /// plugin's private credential and settings namespaces live.
    pub fn new(
        plugin_id: impl Into<String>,
        storage_root: &Path,
        bus: EventBus,
        limits: watch::Receiver<SafetyLimits>,
    ) -> anyhow::Result<Arc<Self>> {
        let plugin_id = plugin_id.into();
        let credentials = CredentialStore::open(storage_root, &plugin_id)?;
        let settings = SettingsStore::open(storage_root, &plugin_id)?;
        Ok(Arc::new(Self {
            events: ScopedEventBus {
                bus,
                sender_id: plugin_id.clone(),
            },
            plugin_id,
            limits,
            credentials,
            settings,
        }))
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// The restricted context is its own application context; there is no
    /// parent to escape to.
    pub fn application_context(self: &Arc<Self>) -> Arc<Self> {
        Arc::clone(self)
    }

    /// Read-only reactive safety-limits value. Plugins get a receiver, never
    /// the sender side.
    pub fn safety_limits(&self) -> watch::Receiver<SafetyLimits> {
        self.limits.clone()
    }

    /// Event-bus handle scoped to this plugin's sender id.
    pub fn events(&self) -> &ScopedEventBus {
        &self.events
    }

    /// This plugin's private credential namespace.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// This plugin's private settings namespace.
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Debug logger. Lines are attributed to the plugin id.
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin_id, "{message}");
    }

    /// Request an allowlisted system service.
    pub fn system_service(&self, service: SystemService) -> Result<ServiceGrant, SandboxError> {
        if ALLOWED_SERVICES.contains(&service) {
            Ok(ServiceGrant { kind: service })
        } else {
            warn!(plugin = %self.plugin_id, service = %service, "denied system service request");
            Err(SandboxError::ServiceNotAllowed(service))
        }
    }

    fn deny(&self, operation: BlockedOperation) -> SandboxError {
        warn!(plugin = %self.plugin_id, operation = %operation, "blocked sandbox operation");
        SandboxError::BlockedOperation(operation)
    }

    // -------------------------------------------------------------------------
    // Blocked entry points. Each fails with an error naming the exact
    // operation; the host surface these shadow is never reachable from here.
    // -------------------------------------------------------------------------

    pub fn start_activity(&self, _target: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::StartActivity))
    }

    pub fn start_service(&self, _target: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::StartService))
    }

    pub fn start_foreground_service(&self, _target: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::StartForegroundService))
    }

    pub fn send_broadcast(&self, _target: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::SendBroadcast))
    }

    pub fn bind_service(&self, _target: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::BindService))
    }

    pub fn register_receiver(&self, _filter: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::RegisterReceiver))
    }

    pub fn content_resolver(&self) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::ContentResolver))
    }

    /// There is deliberately no way to obtain the unrestricted parent.
    pub fn base_context(&self) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::BaseContext))
    }

    pub fn create_package_context(&self, _package: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::CreatePackageContext))
    }

    pub fn open_file(&self, _name: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::OpenFile))
    }

    pub fn delete_file(&self, _name: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::DeleteFile))
    }

    pub fn open_database(&self, _name: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::OpenDatabase))
    }

    pub fn delete_database(&self, _name: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::DeleteDatabase))
    }

    pub fn database_path(&self, _name: &str) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::DatabasePath))
    }

    pub fn device_protected_storage_context(&self) -> Result<(), SandboxError> {
        Err(self.deny(BlockedOperation::DeviceProtectedStorage))
    }
}
