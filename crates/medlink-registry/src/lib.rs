//! Plugin discovery, activation, and package installation.
//!
//! The registry is the only owner of plugin instances. Factories are
//! registered at the composition root, gated by an exact API-version match,
//! and built against the restricted [`medlink_sandbox::SandboxedContext`].
//! Runtime-loaded packages go through the manifest and installer gates in
//! [`manifest`] and [`installer`].

pub mod installer;
pub mod limits_source;
pub mod manifest;
pub mod prefs;
pub mod registry;

pub use installer::{
    sanitize_package_name, InstallError, InstalledPackage, PluginInstaller, PACKAGE_EXTENSION,
};
pub use limits_source::TomlLimitsSource;
pub use manifest::{parse_manifest, ManifestError, PluginManifest, MANIFEST_PATH};
pub use prefs::{ActivationStore, FileActivationStore, MemoryActivationStore};
pub use registry::{PluginFactory, PluginRegistry};
