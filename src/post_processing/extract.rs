//! Archive extraction through the system `tar`

use crate::error::{Error, PostProcessError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Name of the dataset directory inside every Photon dump
pub const DATASET_DIR: &str = "photon_data";

/// Unpacks a downloaded index archive
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract `archive` and return the directory holding the dataset
    async fn extract(&self, archive: &Path) -> Result<PathBuf>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Extractor shelling out to `tar`, with a parallel bzip2 when one is installed
///
/// ```no_run
/// use photon_updater::post_processing::{Extractor, TarExtractor};
/// use std::path::{Path, PathBuf};
///
/// # async fn example() -> photon_updater::Result<()> {
/// let extractor = TarExtractor::from_path(PathBuf::from("/photon/data/temp"))
///     .expect("tar not found in PATH");
/// let dataset = extractor.extract(Path::new("/photon/data/temp/photon-db-latest.tar.bz2")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TarExtractor {
    tar: PathBuf,
    decompressor: Option<PathBuf>,
    output_dir: PathBuf,
}

impl TarExtractor {
    /// Create an extractor with explicit binaries
    pub fn new(tar: PathBuf, decompressor: Option<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            tar,
            decompressor,
            output_dir,
        }
    }

    /// Locate `tar` (and `lbzip2` or `pbzip2` if present) in PATH
    ///
    /// Returns `None` when `tar` itself is missing.
    pub fn from_path(output_dir: PathBuf) -> Option<Self> {
        let tar = which::which("tar").ok()?;
        let decompressor = ["lbzip2", "pbzip2"]
            .iter()
            .find_map(|bin| which::which(bin).ok());
        Some(Self::new(tar, decompressor, output_dir))
    }

    /// The parallel decompressor in use, if any
    pub fn decompressor(&self) -> Option<&Path> {
        self.decompressor.as_deref()
    }

    fn command(&self, archive: &Path) -> Command {
        let mut cmd = Command::new(&self.tar);
        match &self.decompressor {
            Some(program) => {
                cmd.arg(format!("--use-compress-program={}", program.display()))
                    .arg("-xf");
            }
            None => {
                cmd.arg("-xjf");
            }
        }
        cmd.arg(archive).arg("-C").arg(&self.output_dir);
        cmd
    }
}

#[async_trait]
impl Extractor for TarExtractor {
    async fn extract(&self, archive: &Path) -> Result<PathBuf> {
        let failed = |reason: String| {
            Error::PostProcess(PostProcessError::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason,
            })
        };

        tokio::fs::create_dir_all(&self.output_dir).await?;

        tracing::info!(
            archive = %archive.display(),
            decompressor = self.decompressor.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "bzip2".into()),
            "Extracting index"
        );

        let output = self
            .command(archive)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute tar: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "tar exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let dataset = self.output_dir.join(DATASET_DIR);
        if !tokio::fs::metadata(&dataset).await.is_ok_and(|m| m.is_dir()) {
            return Err(failed(format!("archive did not contain {DATASET_DIR}/")));
        }

        tracing::debug!(dataset = %dataset.display(), "Extraction finished");
        Ok(dataset)
    }

    fn name(&self) -> &'static str {
        "tar"
    }
}
