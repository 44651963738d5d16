//! Top-level update workflow
//!
//! ```text
//! reset staging → resolve URL → probe size → disk budget
//!   → fetch archive (+ .md5) → extract → verify → publish → clear staging
//! ```
//!
//! Every step is awaited before the next one starts. Collaborators are held as
//! trait objects so the workflow can be driven with fakes.

use crate::config::{Config, DownloadConfig, PathsConfig};
use crate::disk_space::{DiskBudget, SpaceMode, SystemSpaceProbe};
use crate::error::{DownloadError, Error, PostProcessError, Result};
use crate::post_processing::{
    ChecksumVerifier, DirectoryPublisher, Extractor, Md5Verifier, Publisher, TarExtractor,
};
use crate::region::{BuiltinRegions, DatasetUrls, RegionResolver};
use crate::transfer::{HttpProbe, ProgressCallback, RemoteSizeProbe, Transporter, build_client};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the archive inside staging
pub const ARCHIVE_FILE: &str = "photon-db-latest.tar.bz2";

/// File name of the checksum inside staging
pub const CHECKSUM_FILE: &str = "photon-db-latest.tar.bz2.md5";

/// Something that can run one update
#[async_trait]
pub trait Updater: Send + Sync {
    /// Run a complete update under the given disk space policy
    async fn update(&self, mode: SpaceMode) -> Result<UpdateReport>;
}

/// What a successful update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Archive that was installed
    pub archive_url: String,
    /// Size reported by the server before the transfer, 0 if unknown
    pub remote_size: u64,
    /// Whether the archive was checked against its `.md5` file
    pub checksum_verified: bool,
    /// Directory the index was published to
    pub published_to: PathBuf,
}

/// Pluggable pieces of the workflow
#[derive(Clone)]
pub struct Collaborators {
    /// Region selector resolution
    pub regions: Arc<dyn RegionResolver>,
    /// Remote size lookup before the transfer
    pub size_probe: Arc<dyn RemoteSizeProbe>,
    /// Archive extraction
    pub extractor: Arc<dyn Extractor>,
    /// Checksum verification
    pub verifier: Arc<dyn ChecksumVerifier>,
    /// Installing the extracted index
    pub publisher: Arc<dyn Publisher>,
}

/// Drives one update from staging reset to publish
pub struct UpdateOrchestrator {
    download: DownloadConfig,
    paths: PathsConfig,
    budget: DiskBudget,
    transporter: Transporter,
    collaborators: Collaborators,
}

impl UpdateOrchestrator {
    /// Assemble an orchestrator from explicit parts
    pub fn new(
        config: &Config,
        budget: DiskBudget,
        transporter: Transporter,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            download: config.download.clone(),
            paths: config.paths.clone(),
            budget,
            transporter,
            collaborators,
        }
    }

    /// Wire the production collaborators: HTTP, `tar`, MD5, directory renames
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built or `tar` is not installed.
    pub fn from_config(config: &Config, progress: Option<ProgressCallback>) -> Result<Self> {
        let client = build_client(&config.download)?;
        let probe = Arc::new(HttpProbe::new(client.clone(), config.download.probe_timeout));

        let mut transporter =
            Transporter::new(client, probe.clone(), &config.download, config.retry.clone());
        if let Some(progress) = progress {
            transporter = transporter.with_progress(progress);
        }

        let staging = config.paths.temp_dir();
        let extractor = TarExtractor::from_path(staging.clone())
            .ok_or_else(|| Error::NotSupported("tar binary not found in PATH".to_string()))?;
        if let Some(decompressor) = extractor.decompressor() {
            tracing::debug!(decompressor = %decompressor.display(), "using parallel bzip2");
        }

        let collaborators = Collaborators {
            regions: Arc::new(BuiltinRegions),
            size_probe: probe,
            extractor: Arc::new(extractor),
            verifier: Arc::new(Md5Verifier),
            publisher: Arc::new(DirectoryPublisher::new(config.paths.photon_data_dir(), staging)),
        };

        let budget = DiskBudget::new(
            &config.paths,
            config.disk_space.clone(),
            Arc::new(SystemSpaceProbe),
        );

        Ok(Self::new(config, budget, transporter, collaborators))
    }

    /// Run one update
    pub async fn run(&self, mode: SpaceMode) -> Result<UpdateReport> {
        tracing::info!(%mode, "Starting {} update process...", mode);

        let staging = self.paths.temp_dir();
        reset_staging(&staging).await?;

        let urls = DatasetUrls::resolve(&self.download, self.collaborators.regions.as_ref())?;
        let remote_size = self.collaborators.size_probe.size_of(&urls.archive).await;

        if remote_size > 0 {
            if let Err(e) = self.budget.assess(remote_size, mode).await.into_result() {
                tracing::error!("Insufficient disk space for {} update", mode);
                return Err(e);
            }
        } else {
            tracing::warn!("Could not determine download size, proceeding without space check");
        }

        tracing::info!("Downloading index");
        let archive = staging.join(ARCHIVE_FILE);
        self.fetch(&urls.archive, &archive).await?;

        let checksum = if self.download.skip_checksum {
            None
        } else {
            let checksum = staging.join(CHECKSUM_FILE);
            self.fetch(&urls.checksum, &checksum).await?;
            Some(checksum)
        };

        tracing::info!(extractor = self.collaborators.extractor.name(), "Extracting archive...");
        let extracted = self.collaborators.extractor.extract(&archive).await?;

        if let Some(checksum) = &checksum {
            tracing::info!("Verifying checksum...");
            if !self.collaborators.verifier.verify(checksum, &archive).await? {
                return Err(PostProcessError::ChecksumMismatch {
                    archive: archive.clone(),
                    checksum_file: checksum.clone(),
                }
                .into());
            }
            tracing::debug!("Checksum verification successful.");
        }

        tracing::info!("Moving new index into place...");
        self.collaborators.publisher.publish(&extracted).await?;
        self.collaborators.publisher.clear_staging().await;

        tracing::info!(%mode, "{} update process completed successfully.", mode);
        Ok(UpdateReport {
            archive_url: urls.archive,
            remote_size,
            checksum_verified: checksum.is_some(),
            published_to: self.paths.photon_data_dir(),
        })
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        if self.transporter.fetch(url, destination).await {
            Ok(())
        } else {
            Err(DownloadError::TransferFailed {
                url: url.to_string(),
            }
            .into())
        }
    }
}

#[async_trait]
impl Updater for UpdateOrchestrator {
    async fn update(&self, mode: SpaceMode) -> Result<UpdateReport> {
        self.run(mode).await
    }
}

/// Remove and recreate the staging directory
async fn reset_staging(staging: &Path) -> Result<()> {
    let unavailable = |e: std::io::Error| {
        Error::Download(DownloadError::StagingUnavailable {
            path: staging.to_path_buf(),
            reason: e.to_string(),
        })
    };

    if tokio::fs::metadata(staging).await.is_ok_and(|m| m.is_dir()) {
        tracing::debug!(path = %staging.display(), "Removing existing staging directory");
        tokio::fs::remove_dir_all(staging).await.map_err(|e| {
            tracing::error!(path = %staging.display(), error = %e, "Failed to remove existing staging directory");
            unavailable(e)
        })?;
    }

    tracing::debug!(path = %staging.display(), "Creating staging directory");
    tokio::fs::create_dir_all(staging).await.map_err(unavailable)
}
