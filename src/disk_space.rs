//! Disk space budgeting for index updates
//!
//! An update needs room for the compressed archive plus its extracted contents
//! in the staging area. The parallel strategy additionally needs room for the
//! extracted index in the data area, since the old index stays live until the
//! swap. Free space is probed through [`SpaceProbe`] so the decision can be
//! exercised with fixed figures.

use crate::config::{DiskSpaceConfig, PathsConfig};
use crate::error::{Error, Result, SpaceArea};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Get available disk space for a given path
///
/// Returns the number of bytes available to unprivileged users on the
/// filesystem containing `path`.
///
/// # Errors
///
/// Returns an error if the path does not exist, the platform call fails, or
/// the platform is not supported.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zeroed and
        // only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail excludes blocks reserved for root
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out pointer refers to
        // a live u64 that is only read after the call succeeds.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Source of free-space figures
pub trait SpaceProbe: Send + Sync {
    /// Bytes available at `path`, or `None` when it cannot be determined
    fn available(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpaceProbe;

impl SpaceProbe for SystemSpaceProbe {
    fn available(&self, path: &Path) -> Option<u64> {
        match get_available_space(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to probe free space");
                None
            }
        }
    }
}

/// Disk space policy of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceMode {
    /// Archive and extracted index share the staging area only
    Sequential,
    /// Staging as above, plus the extracted index must fit in the data area
    Parallel,
}

impl std::fmt::Display for SpaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpaceMode::Sequential => write!(f, "sequential"),
            SpaceMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Figures behind a disk space decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceAssessment {
    /// Mode the figures were computed for
    pub mode: SpaceMode,
    /// Compressed archive size
    pub download_size: u64,
    /// Estimated size of the extracted index
    pub extracted_estimate: u64,
    /// Bytes needed in the staging area
    pub staging_required: u64,
    /// Bytes free in the staging area
    pub staging_available: u64,
    /// Bytes needed in the data area (parallel only)
    pub data_required: Option<u64>,
    /// Bytes free in the data area (parallel only)
    pub data_available: Option<u64>,
    /// Combined total, logged for parallel updates but never enforced
    pub parallel_total: Option<u64>,
    /// First area that failed its check
    pub shortfall: Option<SpaceArea>,
}

impl SpaceAssessment {
    /// Whether every enforced check passed
    pub fn allowed(&self) -> bool {
        self.shortfall.is_none()
    }

    /// Convert a failed assessment into [`Error::InsufficientSpace`]
    pub fn into_result(self) -> Result<Self> {
        match self.shortfall {
            None => Ok(self),
            Some(SpaceArea::Staging) => Err(Error::InsufficientSpace {
                area: SpaceArea::Staging,
                required: self.staging_required,
                available: self.staging_available,
            }),
            Some(SpaceArea::Data) => Err(Error::InsufficientSpace {
                area: SpaceArea::Data,
                required: self.data_required.unwrap_or_default(),
                available: self.data_available.unwrap_or_default(),
            }),
        }
    }
}

/// Go/no-go decision on whether an archive of a given size can be processed
pub struct DiskBudget {
    staging_dir: PathBuf,
    data_dir: PathBuf,
    base_dir: PathBuf,
    config: DiskSpaceConfig,
    probe: Arc<dyn SpaceProbe>,
}

impl DiskBudget {
    /// Create a budget over the container layout
    pub fn new(paths: &PathsConfig, config: DiskSpaceConfig, probe: Arc<dyn SpaceProbe>) -> Self {
        Self {
            staging_dir: paths.temp_dir(),
            data_dir: paths.photon_data_dir(),
            base_dir: paths.data_dir.clone(),
            config,
            probe,
        }
    }

    /// Estimated extracted size, `size * ratio / 100` rounded down
    pub fn extracted_estimate(&self, download_size: u64) -> u64 {
        scale_percent(download_size, self.config.extraction_ratio_percent)
    }

    /// Decide whether an archive of `download_size` bytes fits
    pub async fn evaluate(&self, download_size: u64, mode: SpaceMode) -> bool {
        self.assess(download_size, mode).await.allowed()
    }

    /// Compute every figure of the decision and log it
    pub async fn assess(&self, download_size: u64, mode: SpaceMode) -> SpaceAssessment {
        let extracted_estimate = self.extracted_estimate(download_size);
        let staging_required = download_size.saturating_add(extracted_estimate);
        let staging_available = self.available_at(&self.staging_dir).await;

        let mut assessment = SpaceAssessment {
            mode,
            download_size,
            extracted_estimate,
            staging_required,
            staging_available,
            data_required: None,
            data_available: None,
            parallel_total: None,
            shortfall: None,
        };

        if mode == SpaceMode::Parallel {
            assessment.data_required = Some(extracted_estimate);
            assessment.data_available = Some(self.available_at(&self.data_dir).await);
            assessment.parallel_total = Some(scale_percent(
                download_size,
                self.config.parallel_total_percent,
            ));
        }

        log_requirements(&assessment);

        if staging_available < staging_required {
            tracing::error!(
                "Insufficient temp space: need {:.2} GB, have {:.2} GB",
                gb(staging_required),
                gb(staging_available)
            );
            assessment.shortfall = Some(SpaceArea::Staging);
            return assessment;
        }

        if let (Some(required), Some(available)) = (assessment.data_required, assessment.data_available)
            && available < required
        {
            tracing::error!(
                "Insufficient data space: need {:.2} GB, have {:.2} GB",
                gb(required),
                gb(available)
            );
            assessment.shortfall = Some(SpaceArea::Data);
            return assessment;
        }

        tracing::info!("Sufficient disk space available for update");
        assessment
    }

    // Directories that do not exist yet are measured on the base data dir
    async fn available_at(&self, preferred: &Path) -> u64 {
        let exists = tokio::fs::try_exists(preferred).await.unwrap_or(false);
        let path = if exists { preferred } else { &self.base_dir };
        self.probe.available(path).unwrap_or(0)
    }
}

fn log_requirements(a: &SpaceAssessment) {
    tracing::info!(mode = %a.mode, "{} update space requirements:", capitalized(a.mode));
    tracing::info!("  Download size: {:.2} GB", gb(a.download_size));
    tracing::info!("  Estimated extracted size: {:.2} GB", gb(a.extracted_estimate));
    match a.mode {
        SpaceMode::Sequential => {
            tracing::info!("  Temp space needed: {:.2} GB", gb(a.staging_required));
            tracing::info!("  Temp space available: {:.2} GB", gb(a.staging_available));
        }
        SpaceMode::Parallel => {
            tracing::info!("  Total space needed: {:.2} GB", gb(a.parallel_total.unwrap_or_default()));
            tracing::info!("  Temp space available: {:.2} GB", gb(a.staging_available));
            tracing::info!("  Data space available: {:.2} GB", gb(a.data_available.unwrap_or_default()));
        }
    }
}

fn capitalized(mode: SpaceMode) -> &'static str {
    match mode {
        SpaceMode::Sequential => "Sequential",
        SpaceMode::Parallel => "Parallel",
    }
}

fn scale_percent(size: u64, percent: u64) -> u64 {
    let scaled = u128::from(size) * u128::from(percent) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Bytes expressed in GiB, for log lines
pub fn gb(bytes: u64) -> f64 {
    bytes as f64 / GIB
}
