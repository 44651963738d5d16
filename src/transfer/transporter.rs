//! Streaming, resumable single-file HTTP transfer
//!
//! Each attempt resumes from the checkpoint left by a previous attempt (or a
//! previous process) when the server honors byte ranges, streams the body to
//! disk, and checkpoints every `checkpoint_interval_bytes`. Transient transport
//! failures are retried through [`download_with_retry`].

use super::probe::{RangeProbe, header_u64};
use super::progress::{ProgressCallback, ThroughputMeter, TransferSummary};
use super::state::TransferState;
use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{DownloadError, Error, Result};
use crate::retry::download_with_retry;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Resumable HTTP downloader for a single file
pub struct Transporter {
    client: reqwest::Client,
    range_probe: Arc<dyn RangeProbe>,
    retry: RetryConfig,
    checkpoint_interval: u64,
    log_interval: Duration,
    read_timeout: Duration,
    progress: Option<ProgressCallback>,
}

/// Where an attempt starts writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResumePoint {
    offset: u64,
    append: bool,
}

impl ResumePoint {
    const FRESH: ResumePoint = ResumePoint {
        offset: 0,
        append: false,
    };
}

impl Transporter {
    /// Create a transporter from the download and retry settings
    pub fn new(
        client: reqwest::Client,
        range_probe: Arc<dyn RangeProbe>,
        download: &DownloadConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            range_probe,
            retry,
            checkpoint_interval: download.checkpoint_interval_bytes.max(1),
            log_interval: download.progress_log_interval,
            read_timeout: download.read_timeout,
            progress: None,
        }
    }

    /// Report `(downloaded, total)` after every chunk
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Download `url` to `destination`, resuming a previous partial transfer if possible
    ///
    /// Returns `false` when retries are exhausted or a permanent error occurs;
    /// the reason is logged. A checkpoint left behind by a short transfer is kept
    /// for the next run.
    pub async fn fetch(&self, url: &str, destination: &Path) -> bool {
        match self.try_fetch(url, destination).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url, destination = %destination.display(), error = %e, "Download failed");
                false
            }
        }
    }

    /// Same as [`fetch`](Self::fetch) but returns the summary or the final error
    pub async fn try_fetch(&self, url: &str, destination: &Path) -> Result<TransferSummary> {
        let started = Instant::now();
        let summary = download_with_retry(&self.retry, || self.attempt(url, destination, started)).await?;
        tracing::info!(
            bytes = summary.bytes,
            duration_secs = summary.duration.as_secs_f64(),
            "{}",
            summary
        );
        Ok(summary)
    }

    async fn attempt(&self, url: &str, destination: &Path, started: Instant) -> Result<TransferSummary> {
        let mut resume = self.resume_point(url, destination).await;

        let mut request = self.client.get(url);
        if resume.offset > 0 && self.range_probe.supports_resume(url).await {
            request = request.header(RANGE, format!("bytes={}-", resume.offset));
        }

        let response = request.send().await?.error_for_status()?;
        let status = response.status();

        // Anything but 206 carries the body from byte 0
        if resume.offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            tracing::warn!(url, "Server doesn't support range requests, restarting download");
            remove_partial(destination).await?;
            resume = ResumePoint::FRESH;
        }

        let total_size = total_size(&response, resume.offset);
        if total_size > 0 {
            tracing::info!(
                "Starting download of {:.2}GB to {}",
                crate::disk_space::gb(total_size),
                file_name(destination)
            );
        }

        let mut file = open_destination(destination, resume.append).await?;
        let mut downloaded = resume.offset;

        let streamed = self
            .stream_body(response, &mut file, url, destination, total_size, &mut downloaded)
            .await;
        if let Err(e) = streamed {
            let _ = file.flush().await;
            drop(file);
            TransferState::save(destination, url, downloaded, total_size).await;
            return Err(e);
        }

        file.flush().await?;
        drop(file);
        TransferState::save(destination, url, downloaded, total_size).await;

        if total_size > 0 && downloaded < total_size {
            return Err(DownloadError::Incomplete {
                url: url.to_string(),
                downloaded,
                expected: total_size,
            }
            .into());
        }

        TransferState::clear(destination).await;
        Ok(TransferSummary {
            bytes: downloaded,
            duration: started.elapsed(),
        })
    }

    async fn stream_body(
        &self,
        mut response: reqwest::Response,
        file: &mut File,
        url: &str,
        destination: &Path,
        total_size: u64,
        downloaded: &mut u64,
    ) -> Result<()> {
        let mut last_checkpoint = *downloaded;
        let mut meter = ThroughputMeter::new(self.log_interval, Instant::now(), *downloaded);
        self.report(*downloaded, total_size);

        loop {
            let chunk = match tokio::time::timeout(self.read_timeout, response.chunk()).await {
                Ok(chunk) => chunk?,
                Err(_) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no data received for {}s", self.read_timeout.as_secs()),
                    )));
                }
            };
            let Some(chunk) = chunk else { break };
            if chunk.is_empty() {
                continue;
            }

            file.write_all(&chunk).await?;
            *downloaded += chunk.len() as u64;
            self.report(*downloaded, total_size);

            if let Some(sample) = meter.observe(Instant::now(), *downloaded, total_size) {
                tracing::info!("{}", sample);
            }

            if *downloaded - last_checkpoint >= self.checkpoint_interval {
                file.flush().await?;
                TransferState::save(destination, url, *downloaded, total_size).await;
                last_checkpoint = *downloaded;
            }
        }

        Ok(())
    }

    async fn resume_point(&self, url: &str, destination: &Path) -> ResumePoint {
        match TransferState::load(destination).await {
            Some(state) if state.url == url && state.downloaded_bytes > 0 => {
                tracing::info!("Resuming download from byte {}", state.downloaded_bytes);
                ResumePoint {
                    offset: state.downloaded_bytes,
                    append: true,
                }
            }
            Some(state) => {
                tracing::info!(
                    previous_url = %state.url,
                    "Download state belongs to another source, starting fresh"
                );
                ResumePoint::FRESH
            }
            None => ResumePoint::FRESH,
        }
    }

    fn report(&self, downloaded: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(downloaded, total);
        }
    }
}

/// Full size of the remote file as implied by the response
fn total_size(response: &reqwest::Response, resume_offset: u64) -> u64 {
    let headers = response.headers();
    let content_length = header_u64(headers, CONTENT_LENGTH);

    if response.status() == StatusCode::PARTIAL_CONTENT {
        let from_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return from_range.unwrap_or_else(|| resume_offset + content_length.unwrap_or(0));
    }

    content_length.unwrap_or(0)
}

async fn open_destination(destination: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    if append {
        options.append(true).create(true);
    } else {
        options.write(true).create(true).truncate(true);
    }
    Ok(options.open(destination).await?)
}

async fn remove_partial(destination: &Path) -> Result<()> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
