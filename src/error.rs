//! Error types for photon-updater
//!
//! This module provides the error taxonomy for the update pipeline, including:
//! - Domain-specific error types (Download, PostProcess, Config, etc.)
//! - Process exit code mapping for the container entrypoint
//! - Machine-readable error codes for logs and notifications

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for photon-updater operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for a successful run
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code for any fatal failure other than insufficient disk space
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for insufficient disk space (`EX_TEMPFAIL` from sysexits.h)
///
/// Operators can react to this one by provisioning more storage instead of
/// investigating a bug.
pub const EXIT_INSUFFICIENT_SPACE: u8 = 75;

/// Storage area that a disk space requirement applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceArea {
    /// Temporary directory holding the archive and its extracted contents
    Staging,
    /// Directory holding the published index
    Data,
}

impl fmt::Display for SpaceArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceArea::Staging => write!(f, "temp"),
            SpaceArea::Data => write!(f, "data"),
        }
    }
}

/// Main error type for photon-updater
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The environment variable that caused the error (e.g., "REGION")
        key: Option<String>,
    },

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Post-processing error (extract, verify, publish, cleanup)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space for the update
    #[error("insufficient {area} space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Storage area that failed the check
        area: SpaceArea,
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// External tool execution failed (tar, lbzip2, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, unsupported platform, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to an environment variable
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// All transfer attempts failed
    #[error("failed to download {url}")]
    TransferFailed {
        /// The URL that could not be fetched
        url: String,
    },

    /// The stream ended before the advertised size was reached
    #[error("download incomplete: {downloaded}/{expected} bytes from {url}")]
    Incomplete {
        /// The URL being fetched
        url: String,
        /// Bytes present in the destination file
        downloaded: u64,
        /// Total size reported by the server
        expected: u64,
    },

    /// The staging directory could not be reset
    #[error("failed to reset staging directory {path}: {reason}")]
    StagingUnavailable {
        /// The staging directory
        path: PathBuf,
        /// The reason the reset failed
        reason: String,
    },
}

/// Post-processing errors (extraction, checksum verification, publishing)
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Archive checksum does not match the published checksum
    #[error("checksum mismatch for {archive} (checked against {checksum_file})")]
    ChecksumMismatch {
        /// The archive that was verified
        archive: PathBuf,
        /// The checksum file it was verified against
        checksum_file: PathBuf,
    },

    /// Checksum file could not be parsed
    #[error("invalid checksum file {path}: {reason}")]
    InvalidChecksumFile {
        /// The checksum file
        path: PathBuf,
        /// The reason it was rejected
        reason: String,
    },

    /// Directory move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the directory being moved
        source_path: PathBuf,
        /// The destination path where the directory should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },
}

/// Map errors to process exit codes for the container entrypoint
///
/// This trait maps domain errors to the exit signal the process terminates with.
pub trait ToExitCode {
    /// Get the process exit code for this error
    fn exit_code(&self) -> u8;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> u8 {
        match self {
            Error::InsufficientSpace { .. } => EXIT_INSUFFICIENT_SPACE,
            _ => EXIT_FAILURE,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Download(e) => match e {
                DownloadError::TransferFailed { .. } => "transfer_failed",
                DownloadError::Incomplete { .. } => "download_incomplete",
                DownloadError::StagingUnavailable { .. } => "staging_unavailable",
            },
            Error::PostProcess(e) => match e {
                PostProcessError::ExtractionFailed { .. } => "extraction_failed",
                PostProcessError::ChecksumMismatch { .. } => "checksum_mismatch",
                PostProcessError::InvalidChecksumFile { .. } => "invalid_checksum_file",
                PostProcessError::MoveFailed { .. } => "move_failed",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}
