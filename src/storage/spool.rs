//! Local temporary copies of uploaded files.
//!
//! A [`SpooledFile`] owns its copy and removes it when dropped, so the copy
//! goes away on every path out of a request, including a handler future
//! dropped mid-upload.

use crate::error::{AppError, AppResult};
use crate::storage::types::extension_of;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary file removed on drop.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
}

impl SpooledFile {
    /// Take ownership of an existing file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Temporary file {} already gone", self.path.display())
            }
            Err(e) => warn!("Error deleting temporary file {}: {}", self.path.display(), e),
        }
    }
}

/// Write an incoming file to `dir` under a fresh unique name.
pub async fn spool(dir: &Path, original_name: &str, content: &[u8]) -> AppResult<SpooledFile> {
    let path = dir.join(format!(
        "{}{}",
        Uuid::new_v4(),
        extension_of(original_name).unwrap_or_default()
    ));
    // Owned before the write so a partial file is removed too.
    let file = SpooledFile::from_path(path);
    tokio::fs::write(file.path(), content).await.map_err(|e| {
        AppError::upload(format!(
            "failed to write temporary file {}: {}",
            file.path().display(),
            e
        ))
    })?;
    debug!(
        "Spooled {} ({} bytes) to {}",
        original_name,
        content.len(),
        file.path().display()
    );
    Ok(file)
}
