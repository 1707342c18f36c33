//! Plugin manifest parsing.
//!
//! A plugin package carries a small JSON manifest at a fixed, well-known
//! path. Parsing distinguishes two failure modes: a document that is not
//! JSON at all ("invalid document"), and a JSON document missing a required
//! field (the error names the *first* missing field).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known manifest location inside a plugin package.
pub const MANIFEST_PATH: &str = "META-INF/medlink-plugin.json";

/// Required manifest fields, in the order missing-field errors report them.
const REQUIRED_FIELDS: &[&str] = &["factoryClass", "apiVersion", "id", "name", "version"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    /// The manifest is not parseable JSON at all.
    #[error("plugin manifest is not a valid JSON document: {0}")]
    InvalidDocument(String),

    /// The manifest parses but lacks a required field.
    #[error("plugin manifest is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Parsed plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Factory reference resolved against the host's closed factory registry.
    pub factory_class: String,
    /// Declared API version; gated against the host constant at load time.
    pub api_version: u32,
    /// Stable plugin id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Optional; empty string, never null, when absent.
    #[serde(default)]
    pub author: String,
    /// Optional; empty string, never null, when absent.
    #[serde(default)]
    pub description: String,
}

/// Parse a manifest document.
pub fn parse_manifest(document: &str) -> Result<PluginManifest, ManifestError> {
    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| ManifestError::InvalidDocument(e.to_string()))?;

    // Report the first missing required field by name before handing the
    // document to serde, whose own error order is not guaranteed.
    for field in REQUIRED_FIELDS {
        if value.get(field).is_none() {
            return Err(ManifestError::MissingField(field));
        }
    }

    serde_json::from_value(value).map_err(|e| ManifestError::InvalidDocument(e.to_string()))
}
