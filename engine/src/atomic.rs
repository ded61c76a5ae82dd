//! Whole-file atomic replacement
//!
//! Write to a sibling temp file, then rename over the target. An interrupted
//! run leaves either the old content or the new content, never a mix.

use crate::error::MigrationResult;
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `contents`
pub fn write_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> MigrationResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    std::fs::write(&temp_path, contents)?;

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// `config/pipeline.php` -> `config/.pipeline.php.migration-tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.migration-tmp", file_name))
}
