//! Progress reporting for long transfers

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Callback invoked with `(downloaded, total)` after every chunk; `total` is 0 when unknown
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Throughput measured over one logging interval
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    /// Bytes present locally
    pub downloaded: u64,
    /// Full size of the remote file
    pub total: u64,
    /// Megabits per second over the interval
    pub mbps: f64,
    /// Time left at the interval's rate, `None` if nothing arrived
    pub eta: Option<Duration>,
}

impl ThroughputSample {
    /// Completion percentage
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.downloaded as f64 / self.total as f64 * 100.0
        }
    }
}

impl fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Download progress: {:.1}% ({:.2}GB / {:.2}GB) - {:.1} Mbps - ETA: {}",
            self.percent(),
            self.downloaded as f64 / GIB,
            self.total as f64 / GIB,
            self.mbps,
            format_eta(self.eta)
        )
    }
}

/// Rate-limited throughput calculator
///
/// Emits at most one sample per interval. Each sample reflects only the bytes
/// received since the previous one, so a stall shows up immediately instead of
/// being averaged away over the whole transfer.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    last_at: Instant,
    last_bytes: u64,
}

impl ThroughputMeter {
    /// Start measuring at `now` with `downloaded` bytes already present
    pub fn new(interval: Duration, now: Instant, downloaded: u64) -> Self {
        Self {
            interval,
            last_at: now,
            last_bytes: downloaded,
        }
    }

    /// Feed the current position; returns a sample once per interval when the total is known
    pub fn observe(&mut self, now: Instant, downloaded: u64, total: u64) -> Option<ThroughputSample> {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < self.interval || total == 0 {
            return None;
        }

        let interval_bytes = downloaded.saturating_sub(self.last_bytes);
        let secs = elapsed.as_secs_f64();
        let mbps = if secs > 0.0 {
            interval_bytes as f64 * 8.0 / (secs * 1_000_000.0)
        } else {
            0.0
        };
        let eta = if interval_bytes > 0 && secs > 0.0 {
            let rate = interval_bytes as f64 / secs;
            let remaining = total.saturating_sub(downloaded) as f64;
            Some(Duration::from_secs_f64(remaining / rate))
        } else {
            None
        };

        self.last_at = now;
        self.last_bytes = downloaded;

        Some(ThroughputSample {
            downloaded,
            total,
            mbps,
            eta,
        })
    }
}

/// Render an ETA as `"<h>h <m>m"`, or `"calculating..."` when unknown
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) if !eta.is_zero() => {
            let secs = eta.as_secs();
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
        _ => "calculating...".to_string(),
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    /// Size of the completed file
    pub bytes: u64,
    /// Time since the first attempt started
    pub duration: Duration,
}

impl TransferSummary {
    /// Average throughput in megabits per second
    pub fn mbps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 * 8.0 / (secs * 1_000_000.0)
        } else {
            0.0
        }
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration.as_secs_f64();
        let minutes = secs / 60.0;
        write!(
            f,
            "Download completed: {:.2}GB in {:.1}s ({:.1}m",
            self.bytes as f64 / GIB,
            secs,
            minutes
        )?;
        if minutes > 120.0 {
            write!(f, ", {:.1}h", minutes / 60.0)?;
        }
        write!(f, ") at {:.1} Mbps", self.mbps())
    }
}
