//! Shared fakes for update workflow tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use photon_updater::config::{Config, PathsConfig, RetryConfig};
use photon_updater::disk_space::{DiskBudget, SpaceProbe};
use photon_updater::post_processing::{
    ChecksumVerifier, DATASET_DIR, DirectoryPublisher, Extractor, Md5Verifier, Publisher,
};
use photon_updater::region::BuiltinRegions;
use photon_updater::transfer::{RangeProbe, RemoteSizeProbe, Transporter, build_client};
use photon_updater::{Collaborators, Result, UpdateOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Ordered record of collaborator calls
#[derive(Debug, Default, Clone)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Reports fixed free space for staging and everything else
pub struct FixedSpace {
    pub staging_dir: PathBuf,
    pub staging: u64,
    pub data: u64,
}

impl SpaceProbe for FixedSpace {
    fn available(&self, path: &Path) -> Option<u64> {
        if path == self.staging_dir {
            Some(self.staging)
        } else {
            Some(self.data)
        }
    }
}

/// Remote size lookup with a canned answer
pub struct FixedSize(pub u64);

#[async_trait]
impl RemoteSizeProbe for FixedSize {
    async fn size_of(&self, _url: &str) -> u64 {
        self.0
    }
}

/// Server that never advertises byte ranges
pub struct NoRanges;

#[async_trait]
impl RangeProbe for NoRanges {
    async fn supports_resume(&self, _url: &str) -> bool {
        false
    }
}

/// Creates a minimal index layout instead of running `tar`
pub struct FakeExtractor {
    pub staging: PathBuf,
    pub log: CallLog,
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, archive: &Path) -> Result<PathBuf> {
        self.log.push("extract");
        assert!(archive.is_file(), "archive must be downloaded before extraction");

        let dataset = self.staging.join(DATASET_DIR);
        tokio::fs::create_dir_all(dataset.join("node_1")).await?;
        tokio::fs::write(dataset.join("node_1").join("marker"), b"fresh").await?;
        Ok(dataset)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Real MD5 verification, recorded
pub struct RecordingVerifier {
    pub log: CallLog,
}

#[async_trait]
impl ChecksumVerifier for RecordingVerifier {
    async fn verify(&self, checksum_file: &Path, archive: &Path) -> Result<bool> {
        self.log.push("verify");
        Md5Verifier.verify(checksum_file, archive).await
    }
}

/// Real directory publisher, recorded
pub struct RecordingPublisher {
    pub inner: DirectoryPublisher,
    pub log: CallLog,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, extracted: &Path) -> Result<()> {
        self.log.push("publish");
        self.inner.publish(extracted).await
    }

    async fn clear_staging(&self) {
        self.log.push("clear_staging");
        self.inner.clear_staging().await
    }
}

/// Temporary data dir plus a config pointing at it
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub log: CallLog,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths = PathsConfig {
            data_dir: dir.path().to_path_buf(),
        };
        config.download.base_url = base_url.to_string();
        config.download.read_timeout = Duration::from_secs(5);
        config.retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        Self {
            dir,
            config,
            log: CallLog::default(),
        }
    }

    /// Orchestrator over the fakes, reporting `remote_size` and the given free space
    pub fn orchestrator(&self, remote_size: u64, staging_free: u64, data_free: u64) -> UpdateOrchestrator {
        let paths = &self.config.paths;
        let staging = paths.temp_dir();

        let client = build_client(&self.config.download).unwrap();
        let transporter = Transporter::new(
            client,
            Arc::new(NoRanges),
            &self.config.download,
            self.config.retry.clone(),
        );

        let budget = DiskBudget::new(
            paths,
            self.config.disk_space.clone(),
            Arc::new(FixedSpace {
                staging_dir: staging.clone(),
                staging: staging_free,
                data: data_free,
            }),
        );

        let collaborators = Collaborators {
            regions: Arc::new(BuiltinRegions),
            size_probe: Arc::new(FixedSize(remote_size)),
            extractor: Arc::new(FakeExtractor {
                staging: staging.clone(),
                log: self.log.clone(),
            }),
            verifier: Arc::new(RecordingVerifier {
                log: self.log.clone(),
            }),
            publisher: Arc::new(RecordingPublisher {
                inner: DirectoryPublisher::new(paths.photon_data_dir(), staging),
                log: self.log.clone(),
            }),
        };

        UpdateOrchestrator::new(&self.config, budget, transporter, collaborators)
    }
}
