//! Swapping a freshly extracted index into place

use crate::error::{Error, PostProcessError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Installs an extracted dataset and tidies up staging
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Replace the published index with `extracted`
    async fn publish(&self, extracted: &Path) -> Result<()>;

    /// Remove the staging directory; failures are only logged
    async fn clear_staging(&self);
}

/// Publisher that swaps directories with renames
///
/// The live index is renamed to `<name>.old` first, so a failed swap can be
/// rolled back and a reader never sees a half-copied directory.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    target: PathBuf,
    staging: PathBuf,
}

impl DirectoryPublisher {
    /// Publish into `target`, staging lives in `staging`
    pub fn new(target: PathBuf, staging: PathBuf) -> Self {
        Self { target, staging }
    }

    /// Where the previous index is parked during a swap
    pub fn backup_path(&self) -> PathBuf {
        let mut name = OsString::from(self.target.as_os_str());
        name.push(".old");
        PathBuf::from(name)
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, extracted: &Path) -> Result<()> {
        let backup = self.backup_path();
        let move_failed = |source: &Path, dest: &Path, e: std::io::Error| {
            Error::PostProcess(PostProcessError::MoveFailed {
                source_path: source.to_path_buf(),
                dest_path: dest.to_path_buf(),
                reason: e.to_string(),
            })
        };

        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Leftover from an interrupted swap
        if tokio::fs::metadata(&backup).await.is_ok() {
            tracing::warn!(path = %backup.display(), "Removing stale index backup");
            tokio::fs::remove_dir_all(&backup).await?;
        }

        let had_previous = tokio::fs::metadata(&self.target).await.is_ok();
        if had_previous {
            tracing::debug!(from = %self.target.display(), to = %backup.display(), "Parking current index");
            tokio::fs::rename(&self.target, &backup)
                .await
                .map_err(|e| move_failed(&self.target, &backup, e))?;
        }

        if let Err(e) = tokio::fs::rename(extracted, &self.target).await {
            let err = move_failed(extracted, &self.target, e);
            if had_previous {
                match tokio::fs::rename(&backup, &self.target).await {
                    Ok(()) => tracing::warn!(path = %self.target.display(), "Restored previous index"),
                    Err(restore) => tracing::error!(
                        backup = %backup.display(),
                        error = %restore,
                        "Failed to restore previous index"
                    ),
                }
            }
            return Err(err);
        }

        if had_previous && let Err(e) = tokio::fs::remove_dir_all(&backup).await {
            tracing::warn!(path = %backup.display(), error = %e, "Failed to remove previous index");
        }

        tracing::info!(path = %self.target.display(), "Index published");
        Ok(())
    }

    async fn clear_staging(&self) {
        match tokio::fs::remove_dir_all(&self.staging).await {
            Ok(()) => tracing::debug!(path = %self.staging.display(), "Staging directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.staging.display(), error = %e, "Failed to clear staging directory");
            }
        }
    }
}
