//! Per-plugin namespaced credential storage.
//!
//! Each plugin gets a private key-value file keyed by a sanitized version of
//! its plugin id. Sanitization replaces path-unsafe characters but preserves
//! distinguishing characters such as dots and hyphens, and escapes anything
//! else injectively, so two different ids can never collide after
//! sanitization. Other plugins cannot read the namespace because the store
//! handle is only ever constructed inside that plugin's sandbox.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Map a plugin id to a filesystem-safe namespace.
///
/// ASCII alphanumerics, `.`, `-` and `_` pass through; every other byte is
/// escaped as `%XX` (and `%` itself is escaped), which keeps the mapping
/// injective: distinct ids always produce distinct namespaces.
pub fn sanitize_plugin_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' => {
                out.push(byte as char);
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

/// A saved device pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePairing {
    /// Wireless address of the paired device.
    pub address: String,
    /// Pairing code entered or displayed during bonding.
    pub pairing_code: String,
}

/// Derived-secret material from a key-agreement handshake.
///
/// The handshake itself is performed by an external authenticator
/// collaborator; this store only persists its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSecret {
    pub secret: Vec<u8>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialRecord {
    pairing: Option<DevicePairing>,
    derived_secret: Option<DerivedSecret>,
}

/// File-backed credential store for one plugin namespace.
pub struct CredentialStore {
    path: PathBuf,
    record: Mutex<CredentialRecord>,
}

impl CredentialStore {
    /// Open (or create) the credential namespace for `plugin_id` under
    /// `root`.
    pub fn open(root: &Path, plugin_id: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(root)?;
        let path = root.join(format!("{}.credentials.json", sanitize_plugin_id(plugin_id)));
        let record = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            CredentialRecord::default()
        };
        Ok(Self {
            path,
            record: Mutex::new(record),
        })
    }

    pub fn save_pairing(&self, pairing: DevicePairing) -> anyhow::Result<()> {
        let mut record = self.record.lock();
        record.pairing = Some(pairing);
        self.persist(&record)
    }

    pub fn pairing(&self) -> Option<DevicePairing> {
        self.record.lock().pairing.clone()
    }

    pub fn clear_pairing(&self) -> anyhow::Result<()> {
        let mut record = self.record.lock();
        record.pairing = None;
        self.persist(&record)
    }

    pub fn save_derived_secret(&self, secret: Vec<u8>, nonce: Vec<u8>) -> anyhow::Result<()> {
        let mut record = self.record.lock();
        record.derived_secret = Some(DerivedSecret { secret, nonce });
        self.persist(&record)
    }

    pub fn derived_secret(&self) -> Option<DerivedSecret> {
        self.record.lock().derived_secret.clone()
    }

    /// Wipe the whole namespace, e.g. on unpair.
    pub fn clear_all(&self) -> anyhow::Result<()> {
        let mut record = self.record.lock();
        *record = CredentialRecord::default();
        self.persist(&record)
    }

    fn persist(&self, record: &CredentialRecord) -> anyhow::Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitization_preserves_distinguishing_characters() {
        assert_eq!(sanitize_plugin_id("acme.pump-x2"), "acme.pump-x2");
        // distinct ids stay distinct after escaping
        let a = sanitize_plugin_id("acme/pump");
        let b = sanitize_plugin_id("acme_pump");
        let c = sanitize_plugin_id("acme%pump");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(a, "acme%2Fpump");
        assert_eq!(c, "acme%25pump");
    }

    #[test]
    fn pairing_roundtrips_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path(), "acme.pump").unwrap();
        store
            .save_pairing(DevicePairing {
                address: "00:11:22:33:44:55".into(),
                pairing_code: "123456".into(),
            })
            .unwrap();
        store.save_derived_secret(vec![1, 2, 3], vec![9, 9]).unwrap();

        let reopened = CredentialStore::open(dir.path(), "acme.pump").unwrap();
        assert_eq!(
            reopened.pairing().unwrap().address,
            "00:11:22:33:44:55"
        );
        assert_eq!(reopened.derived_secret().unwrap().secret, vec![1, 2, 3]);
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let a = CredentialStore::open(dir.path(), "acme.pump").unwrap();
        a.save_pairing(DevicePairing {
            address: "AA".into(),
            pairing_code: "1".into(),
        })
        .unwrap();

        let b = CredentialStore::open(dir.path(), "other.pump").unwrap();
        assert!(b.pairing().is_none());
    }

    #[test]
    fn clear_all_wipes_the_namespace() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path(), "acme.pump").unwrap();
        store
            .save_pairing(DevicePairing {
                address: "AA".into(),
                pairing_code: "1".into(),
            })
            .unwrap();
        store.save_derived_secret(vec![7], vec![8]).unwrap();
        store.clear_all().unwrap();

        assert!(store.pairing().is_none());
        assert!(store.derived_secret().is_none());
    }
}
