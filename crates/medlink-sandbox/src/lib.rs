//! Sandboxed execution environment for third-party device-driver plugins.
//!
//! Plugin code receives a [`SandboxedContext`] in place of full host-system
//! access: an allow/deny table over host operations, a closed system-service
//! allowlist, and private per-plugin credential and settings namespaces.

use std::path::PathBuf;

pub mod context;
pub mod credentials;
pub mod settings;

/// Platform-owned directory under which per-plugin credential and settings
/// namespaces live, for hosts that do not supply their own root.
pub fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("medlink")
        .join("plugins")
}

pub use context::{
    BlockedOperation, SandboxError, SandboxedContext, ScopedEventBus, ServiceGrant, SystemService,
    ALLOWED_SERVICES,
};
pub use credentials::{sanitize_plugin_id, CredentialStore, DerivedSecret, DevicePairing};
pub use settings::SettingsStore;
