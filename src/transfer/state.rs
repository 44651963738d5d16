//! Durable checkpoint of an in-progress transfer
//!
//! The record lives next to the destination as `<destination>.download_state`
//! and survives process restarts, so a later run can continue a partial file
//! with a `Range` request instead of starting over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Schema version written by this build
pub const STATE_VERSION: u32 = 1;

const SIDECAR_SUFFIX: &str = ".download_state";

/// Resumable record of a partially downloaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// Record schema version
    pub version: u32,
    /// Source URL the partial file was fetched from
    pub url: String,
    /// File being written
    pub destination: PathBuf,
    /// Bytes of the remote file present locally
    pub downloaded_bytes: u64,
    /// Full size of the remote file, 0 when unknown
    pub total_size: u64,
    /// Size of the destination file when the record was written
    pub file_size: u64,
    /// When the record was written
    pub updated_at: DateTime<Utc>,
}

/// Path of the checkpoint record belonging to `destination`
pub fn sidecar_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

impl TransferState {
    /// Record progress for `destination`
    ///
    /// The on-disk size of `destination` is captured as `file_size`. Failures are
    /// logged and otherwise ignored: losing a checkpoint only costs a restart.
    pub async fn save(destination: &Path, url: &str, downloaded_bytes: u64, total_size: u64) {
        let file_size = match tokio::fs::metadata(destination).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let state = TransferState {
            version: STATE_VERSION,
            url: url.to_string(),
            destination: destination.to_path_buf(),
            downloaded_bytes,
            total_size,
            file_size,
            updated_at: Utc::now(),
        };

        let path = sidecar_path(destination);
        let result = match serde_json::to_vec(&state) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(crate::error::Error::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save download state");
        }
    }

    /// Load and validate the checkpoint for `destination`
    ///
    /// Returns `None` when there is nothing trustworthy to resume from. A
    /// record that is unreadable, from another schema version, written for a
    /// different path, or that claims more bytes than the file holds is
    /// deleted. When the file has grown past the recorded size (a write landed
    /// after the last checkpoint) the actual size wins.
    pub async fn load(destination: &Path) -> Option<TransferState> {
        let path = sidecar_path(destination);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load download state");
                Self::clear(destination).await;
                return None;
            }
        };

        let mut state: TransferState = match serde_json::from_slice(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load download state");
                Self::clear(destination).await;
                return None;
            }
        };

        if state.version != STATE_VERSION {
            tracing::warn!(
                found = state.version,
                expected = STATE_VERSION,
                "Discarding download state with unsupported version"
            );
            Self::clear(destination).await;
            return None;
        }

        if state.destination != destination {
            tracing::warn!(
                recorded = %state.destination.display(),
                actual = %destination.display(),
                "Discarding download state recorded for another file"
            );
            Self::clear(destination).await;
            return None;
        }

        let actual_size = match tokio::fs::metadata(destination).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                tracing::info!(
                    destination = %destination.display(),
                    "Partial file missing, starting fresh download"
                );
                Self::clear(destination).await;
                return None;
            }
        };

        if actual_size < state.file_size {
            tracing::warn!(
                "File size mismatch: actual {} < expected {}, starting fresh download",
                actual_size,
                state.file_size
            );
            Self::clear(destination).await;
            return None;
        }

        tracing::info!(
            "Resuming download: file size {} bytes (saved state: {} bytes)",
            actual_size,
            state.file_size
        );
        state.file_size = actual_size;
        state.downloaded_bytes = actual_size;
        Some(state)
    }

    /// Delete the checkpoint for `destination`; missing records are fine
    pub async fn clear(destination: &Path) {
        let path = sidecar_path(destination);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to cleanup download state");
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/photon-db-planet-0.7OS-latest.tar.bz2";

    fn destination(dir: &TempDir) -> PathBuf {
        dir.path().join("photon-db-latest.tar.bz2")
    }

    async fn write_state(destination: &Path, file_size: u64) {
        let state = TransferState {
            version: STATE_VERSION,
            url: URL.to_string(),
            destination: destination.to_path_buf(),
            downloaded_bytes: file_size,
            total_size: 10_000,
            file_size,
            updated_at: Utc::now(),
        };
        tokio::fs::write(sidecar_path(destination), serde_json::to_vec(&state).unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn sidecar_sits_next_to_destination() {
        assert_eq!(
            sidecar_path(Path::new("/photon/data/temp/photon-db-latest.tar.bz2")),
            PathBuf::from("/photon/data/temp/photon-db-latest.tar.bz2.download_state")
        );
    }

    #[tokio::test]
    async fn save_records_on_disk_size() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, vec![0u8; 4096]).await.unwrap();

        TransferState::save(&dest, URL, 4096, 10_000).await;

        let raw = tokio::fs::read(sidecar_path(&dest)).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["url"], URL);
        assert_eq!(json["downloaded_bytes"], 4096);
        assert_eq!(json["total_size"], 10_000);
        assert_eq!(json["file_size"], 4096);
        assert!(json["updated_at"].is_string());
    }

    #[tokio::test]
    async fn load_trusts_a_larger_actual_file() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, vec![1u8; 1500]).await.unwrap();
        write_state(&dest, 1000).await;

        let state = TransferState::load(&dest).await.unwrap();

        assert_eq!(state.file_size, 1500);
        assert_eq!(state.downloaded_bytes, 1500);
        assert_eq!(state.url, URL);
        assert!(sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn load_discards_an_overstated_record() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, vec![1u8; 500]).await.unwrap();
        write_state(&dest, 1000).await;

        assert!(TransferState::load(&dest).await.is_none());
        assert!(!sidecar_path(&dest).exists(), "overstated record must be deleted");
    }

    #[tokio::test]
    async fn load_discards_a_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, b"partial").await.unwrap();
        tokio::fs::write(sidecar_path(&dest), b"{not json").await.unwrap();

        assert!(TransferState::load(&dest).await.is_none());
        assert!(!sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn load_starts_fresh_when_partial_file_is_gone() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        write_state(&dest, 1000).await;

        assert!(TransferState::load(&dest).await.is_none());
        assert!(!sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn load_rejects_records_for_other_paths() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        let other = dir.path().join("other.tar.bz2");
        tokio::fs::write(&dest, vec![0u8; 10]).await.unwrap();
        write_state(&other, 10).await;
        tokio::fs::rename(sidecar_path(&other), sidecar_path(&dest))
            .await
            .unwrap();

        assert!(TransferState::load(&dest).await.is_none());
    }

    #[tokio::test]
    async fn load_rejects_unknown_versions() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, vec![0u8; 10]).await.unwrap();
        let json = serde_json::json!({
            "version": 99,
            "url": URL,
            "destination": dest,
            "downloaded_bytes": 10,
            "total_size": 100,
            "file_size": 10,
            "updated_at": Utc::now(),
        });
        tokio::fs::write(sidecar_path(&dest), json.to_string()).await.unwrap();

        assert!(TransferState::load(&dest).await.is_none());
        assert!(!sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn load_without_record_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(TransferState::load(&destination(&dir)).await.is_none());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let dest = destination(&dir);
        tokio::fs::write(&dest, b"x").await.unwrap();
        TransferState::save(&dest, URL, 1, 1).await;
        assert!(sidecar_path(&dest).exists());

        TransferState::clear(&dest).await;
        TransferState::clear(&dest).await;

        assert!(!sidecar_path(&dest).exists());
    }
}
