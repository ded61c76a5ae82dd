//! Reading and writing composer.json / composer.lock
//!
//! Pure data access: no policy decisions happen here.

use crate::atomic::write_atomic;
use crate::config::{ProjectFiles, ProjectSettings};
use crate::error::{MigrationError, MigrationResult};
use crate::manifest::types::{LockSnapshot, Manifest};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Manifest store for a single project
#[derive(Debug, Clone)]
pub struct ManifestStore {
    manifest_path: PathBuf,
    lock_path: PathBuf,
}

impl ManifestStore {
    /// Create store for explicit file paths
    pub fn new(manifest_path: impl AsRef<Path>, lock_path: impl AsRef<Path>) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            lock_path: lock_path.as_ref().to_path_buf(),
        }
    }

    /// Create store for a project's configured manifest and lock paths
    pub fn open(project: &ProjectSettings, files: &ProjectFiles) -> Self {
        Self::new(project.path(&files.manifest), project.path(&files.lock))
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Fail unless composer.json exists and is writable
    pub fn ensure_writable(&self) -> MigrationResult<()> {
        let metadata = std::fs::metadata(&self.manifest_path).map_err(|_| {
            MigrationError::precondition(format!(
                "File {} does not exist or is not writable.",
                self.manifest_path.display()
            ))
        })?;
        if !metadata.is_file() || metadata.permissions().readonly() {
            return Err(MigrationError::precondition(format!(
                "File {} does not exist or is not writable.",
                self.manifest_path.display()
            )));
        }
        Ok(())
    }

    /// Load composer.json
    pub fn load_manifest(&self) -> MigrationResult<Manifest> {
        let content = std::fs::read_to_string(&self.manifest_path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            MigrationError::invalid_manifest(&self.manifest_path, e.to_string())
        })?;
        Manifest::from_value(&self.manifest_path, value)
    }

    /// Load composer.lock; `None` if the project has no lock file
    pub fn load_lock(&self) -> MigrationResult<Option<LockSnapshot>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.lock_path)?;
        let lock = serde_json::from_str(&content)
            .map_err(|e| MigrationError::invalid_manifest(&self.lock_path, e.to_string()))?;
        Ok(Some(lock))
    }

    /// Prune empty sections and atomically rewrite composer.json
    pub fn save_manifest(&self, manifest: &mut Manifest) -> MigrationResult<()> {
        manifest.prune_empty_sections();
        let content = render_manifest(manifest)?;
        write_atomic(&self.manifest_path, content)?;
        tracing::debug!(path = %self.manifest_path.display(), "Manifest saved");
        Ok(())
    }
}

/// Four-space pretty JSON with unescaped slashes and a trailing newline
pub fn render_manifest(manifest: &Manifest) -> MigrationResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    manifest.as_map().serialize(&mut serializer)?;

    let mut content = String::from_utf8(buf)
        .map_err(|e| MigrationError::invalid_manifest("composer.json", e.to_string()))?;
    content.push('\n');
    Ok(content)
}
