//! # photon-updater
//!
//! Keeps a Photon geocoder index fresh inside a disk-constrained container.
//!
//! ## Design Philosophy
//!
//! photon-updater is designed to be:
//! - **Resumable** - interrupted transfers continue from a checkpoint instead of byte 0
//! - **Space-aware** - an update is refused up front if the disk cannot hold it
//! - **Verified** - archives are checked against the published MD5 before use
//! - **Safe to swap** - the live index is only replaced once the new one is complete
//!
//! ## Quick Start
//!
//! ```no_run
//! use photon_updater::{Config, Entrypoint, UpdateOrchestrator};
//! use photon_updater::notify;
//! use photon_updater::region::BuiltinRegions;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let orchestrator = UpdateOrchestrator::from_config(&config, None)?;
//!     let notifier = notify::from_config(&config.notifications);
//!
//!     let entrypoint = Entrypoint::new(config, Arc::new(orchestrator), notifier, Arc::new(BuiltinRegions));
//!     std::process::exit(entrypoint.startup().await.into());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Disk space budgeting
pub mod disk_space;
/// Startup sequencing and scheduler
pub mod entrypoint;
/// Error types
pub mod error;
/// Status notifications
pub mod notify;
/// Update workflow
pub mod orchestrator;
/// Extraction, verification and publishing
pub mod post_processing;
/// Region catalogue and dataset URLs
pub mod region;
/// Retry logic with exponential backoff
pub mod retry;
/// Resumable archive transfer
pub mod transfer;

// Re-export commonly used types
pub use config::{Config, UpdateStrategy};
pub use disk_space::{DiskBudget, SpaceAssessment, SpaceMode, SpaceProbe, SystemSpaceProbe};
pub use entrypoint::{Entrypoint, StartupAction, shutdown_signal};
pub use error::{
    DownloadError, EXIT_FAILURE, EXIT_INSUFFICIENT_SPACE, EXIT_SUCCESS, Error, PostProcessError,
    Result, SpaceArea, ToExitCode,
};
pub use notify::{NoOpNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{Collaborators, UpdateOrchestrator, UpdateReport, Updater};
pub use post_processing::{
    ChecksumVerifier, DirectoryPublisher, Extractor, Md5Verifier, Publisher, TarExtractor,
};
pub use region::{BuiltinRegions, DatasetUrls, RegionInfo, RegionKind, RegionResolver};
pub use transfer::{HttpProbe, RangeProbe, RemoteSizeProbe, TransferState, Transporter};
