//! Resumable archive transfer
//!
//! - [`state`]: checkpoint record persisted next to the destination
//! - [`probe`]: HEAD-based range support and size probes
//! - [`progress`]: throughput sampling and completion summary
//! - [`transporter`]: the streaming download loop

pub mod probe;
pub mod progress;
pub mod state;
pub mod transporter;

pub use probe::{HttpProbe, RangeProbe, RemoteSizeProbe};
pub use progress::{ProgressCallback, ThroughputMeter, ThroughputSample, TransferSummary, format_eta};
pub use state::{TransferState, sidecar_path};
pub use transporter::Transporter;

use crate::config::DownloadConfig;
use crate::error::Result;

/// Build the HTTP client shared by transfers and probes
///
/// Only the connect phase is bounded here; archive bodies can take hours, so
/// stalls are detected per read by the transporter instead of with a total timeout.
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
