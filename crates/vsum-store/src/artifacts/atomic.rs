//! Atomic write primitives
//!
//! Uses temp→rename pattern to ensure no partial writes. Several writes can
//! be staged first and published only once every one of them succeeded.

use crate::errors::{io_error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Content fully written to a temp file next to its target
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    target_path: PathBuf,
}

impl StagedWrite {
    /// Move the content into place
    pub fn publish(self) -> Result<()> {
        fs::rename(&self.temp_path, &self.target_path)
            .map_err(|e| io_error("rename_artifact_temp", e))
    }

    /// Drop the temp file; the target is untouched
    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.temp_path) {
            tracing::warn!(
                path = %self.temp_path.display(),
                error = %e,
                "Could not remove staged artifact"
            );
        }
    }
}

/// Write bytes to the temp file of `target_path` without touching the target
pub fn stage_write(target_path: &Path, content: &[u8]) -> Result<StagedWrite> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_artifact_dir", e))?;
    }

    let staged = StagedWrite {
        temp_path: target_path.with_extension("tmp"),
        target_path: target_path.to_path_buf(),
    };
    if let Err(e) = fs::write(&staged.temp_path, content) {
        staged.discard();
        return Err(io_error("write_artifact_temp", e));
    }
    Ok(staged)
}

/// Atomically write bytes to a file
///
/// Uses temp file + rename to ensure atomic write
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    stage_write(target_path, content)?.publish()
}

/// Remove a file; returns `false` if it did not exist
pub fn remove_if_exists(target_path: &Path) -> Result<bool> {
    match fs::remove_file(target_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error("remove_artifact", e)),
    }
}
