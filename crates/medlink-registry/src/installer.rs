//! Plugin package installation.
//!
//! Packages from arbitrary sources go through four gates:
//!
//! 1. The filename must end in the expected package extension, checked
//!    before any bytes are written.
//! 2. The filename is sanitized (spaces and punctuation replaced with a safe
//!    separator).
//! 3. The sanitized name must not collide with an already-installed file;
//!    installation fails rather than overwriting.
//! 4. The package's internal structure is validated as a well-formed archive
//!    with the manifest at its well-known path. A package that fails
//!    validation is deleted immediately, never left as a partial artifact.

use crate::manifest::{parse_manifest, ManifestError, PluginManifest, MANIFEST_PATH};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Expected plugin package extension.
pub const PACKAGE_EXTENSION: &str = "mpk";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("package '{0}' does not end in the expected '.{PACKAGE_EXTENSION}' extension")]
    WrongExtension(String),

    #[error("a plugin package named '{0}' already exists")]
    AlreadyExists(String),

    #[error("package '{name}' is not a well-formed plugin archive: {reason}")]
    InvalidArchive { name: String, reason: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Unlike plugin-id sanitization this does not need to be injective; name
/// collisions are caught by the already-exists gate instead.
pub fn sanitize_package_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// An installed package and its parsed manifest.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub path: PathBuf,
    pub manifest: PluginManifest,
}

/// Installs plugin packages into a platform-owned directory.
pub struct PluginInstaller {
    install_dir: PathBuf,
}

impl PluginInstaller {
    pub fn new(install_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let install_dir = install_dir.into();
        fs::create_dir_all(&install_dir)?;
        Ok(Self { install_dir })
    }

    /// Install a package supplied as raw bytes under its original filename.
    ///
    /// Returns the path of the installed package on success.
    pub fn install(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf, InstallError> {
        if !original_name
            .to_ascii_lowercase()
            .ends_with(&format!(".{PACKAGE_EXTENSION}"))
        {
            return Err(InstallError::WrongExtension(original_name.to_string()));
        }

        let sanitized = sanitize_package_name(original_name);
        let destination = self.install_dir.join(&sanitized);
        if destination.exists() {
            return Err(InstallError::AlreadyExists(sanitized));
        }

        fs::write(&destination, bytes)?;

        if let Err(reason) = validate_archive(&destination) {
            // never leave a partial artifact behind
            if let Err(e) = fs::remove_file(&destination) {
                warn!(path = %destination.display(), error = %e, "failed to remove rejected package");
            }
            return Err(InstallError::InvalidArchive {
                name: sanitized,
                reason,
            });
        }

        info!(package = %sanitized, "installed plugin package");
        Ok(destination)
    }

    /// Read and parse the manifest out of an installed package.
    pub fn read_manifest(&self, path: &Path) -> Result<PluginManifest, InstallError> {
        let file = fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| InstallError::InvalidArchive {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut entry =
            archive
                .by_name(MANIFEST_PATH)
                .map_err(|e| InstallError::InvalidArchive {
                    name: path.display().to_string(),
                    reason: format!("no manifest at {MANIFEST_PATH}: {e}"),
                })?;
        let mut document = String::new();
        entry.read_to_string(&mut document)?;
        Ok(parse_manifest(&document)?)
    }

    /// Enumerate installed packages with their manifests. Packages whose
    /// manifest can no longer be read are skipped with a warning.
    pub fn installed(&self) -> std::io::Result<Vec<InstalledPackage>> {
        let mut packages = Vec::new();
        for entry in fs::read_dir(&self.install_dir)? {
            let path = entry?.path();
            let is_package = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
            if !is_package {
                continue;
            }
            match self.read_manifest(&path) {
                Ok(manifest) => packages.push(InstalledPackage { path, manifest }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable package"),
            }
        }
        Ok(packages)
    }
}

/// Structural validation: the file must be a well-formed archive, every
/// entry must be readable, and the manifest must be present.
fn validate_archive(path: &Path) -> Result<(), String> {
    let file = fs::File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    for index in 0..archive.len() {
        archive.by_index(index).map_err(|e| e.to_string())?;
    }
    archive
        .by_name(MANIFEST_PATH)
        .map_err(|_| format!("no manifest at {MANIFEST_PATH}"))?;
    Ok(())
}
