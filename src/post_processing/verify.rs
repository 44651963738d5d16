//! MD5 verification of downloaded archives

use crate::error::{Error, PostProcessError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};

const READ_BUFFER: usize = 1024 * 1024;

/// Verifies an archive against its published checksum
#[async_trait]
pub trait ChecksumVerifier: Send + Sync {
    /// `Ok(false)` on mismatch; `Err` when either file cannot be read or parsed
    async fn verify(&self, checksum_file: &Path, archive: &Path) -> Result<bool>;
}

/// Verifier for `md5sum`-style checksum files
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Verifier;

#[async_trait]
impl ChecksumVerifier for Md5Verifier {
    async fn verify(&self, checksum_file: &Path, archive: &Path) -> Result<bool> {
        let contents = tokio::fs::read_to_string(checksum_file).await?;
        let expected = parse_checksum_file(&contents, checksum_file)?;
        let actual = md5_file(archive.to_path_buf()).await?;

        if actual == expected {
            tracing::debug!(archive = %archive.display(), md5 = %actual, "Checksum verification successful");
            Ok(true)
        } else {
            tracing::error!(
                archive = %archive.display(),
                expected = %expected,
                actual = %actual,
                "Checksum mismatch"
            );
            Ok(false)
        }
    }
}

/// Extract the digest from a checksum file: the first token, 32 hex characters
pub fn parse_checksum_file(contents: &str, path: &Path) -> Result<String> {
    let invalid = |reason: &str| {
        Error::PostProcess(PostProcessError::InvalidChecksumFile {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        })
    };

    let token = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| invalid("file is empty"))?;

    if token.len() != 32 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("first token is not a 32 character hex digest"));
    }

    Ok(token.to_ascii_lowercase())
}

/// Lowercase hex MD5 of a file, computed on the blocking pool
pub async fn md5_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; READ_BUFFER];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        Ok(format!("{:x}", context.compute()))
    })
    .await
    .map_err(|e| Error::Other(format!("checksum task failed: {}", e)))?
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // md5("hello world")
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_md5sum_format() {
        let line = format!("{}  photon-db-planet-0.7OS-latest.tar.bz2\n", HELLO_MD5.to_uppercase());
        assert_eq!(parse_checksum_file(&line, Path::new("x.md5")).unwrap(), HELLO_MD5);
    }

    #[test]
    fn parses_bare_digest() {
        assert_eq!(parse_checksum_file(HELLO_MD5, Path::new("x.md5")).unwrap(), HELLO_MD5);
    }

    #[test]
    fn rejects_malformed_files() {
        for contents in ["", "   \n", "not-a-digest file", "5eb63bbbe01eeed093cb22bb8f5acdc", "zzb63bbbe01eeed093cb22bb8f5acdc3"] {
            let err = parse_checksum_file(contents, Path::new("x.md5")).unwrap_err();
            assert!(
                matches!(err, Error::PostProcess(PostProcessError::InvalidChecksumFile { .. })),
                "{contents:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn md5_of_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.bin", b"hello world");
        assert_eq!(md5_file(path).await.unwrap(), HELLO_MD5);
    }

    #[tokio::test]
    async fn md5_spans_multiple_buffers() {
        let dir = TempDir::new().unwrap();
        let data = vec![7u8; READ_BUFFER * 2 + 17];
        let path = write(&dir, "big.bin", &data);

        assert_eq!(md5_file(path).await.unwrap(), format!("{:x}", md5::compute(&data)));
    }

    #[tokio::test]
    async fn verify_matches_and_mismatches() {
        let dir = TempDir::new().unwrap();
        let archive = write(&dir, "a.tar.bz2", b"hello world");
        let good = write(&dir, "good.md5", format!("{HELLO_MD5}  a.tar.bz2\n").as_bytes());
        let bad = write(&dir, "bad.md5", b"00000000000000000000000000000000  a.tar.bz2\n");

        assert!(Md5Verifier.verify(&good, &archive).await.unwrap());
        assert!(!Md5Verifier.verify(&bad, &archive).await.unwrap());
    }

    #[tokio::test]
    async fn verify_fails_on_missing_archive() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.md5", HELLO_MD5.as_bytes());

        let err = Md5Verifier
            .verify(&good, &dir.path().join("missing.tar.bz2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
