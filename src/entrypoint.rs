//! Container startup logic and the interval scheduler
//!
//! At startup the updater decides between a forced update, an initial
//! download (no index yet) or nothing at all. In scheduled mode it then keeps
//! running the configured strategy every `UPDATE_INTERVAL` until shut down.

use crate::config::{Config, UpdateStrategy};
use crate::disk_space::SpaceMode;
use crate::error::{EXIT_FAILURE, EXIT_SUCCESS, Error, Result, ToExitCode};
use crate::notify::Notifier;
use crate::orchestrator::Updater;
use crate::region::RegionResolver;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What startup decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    /// `FORCE_UPDATE` is set
    ForcedUpdate(SpaceMode),
    /// No index exists yet; always sequential
    InitialDownload,
    /// No index exists and `INITIAL_DOWNLOAD` is off
    SkipInitialDownload,
    /// An index is already published
    IndexPresent,
}

/// Space policy for a configured strategy
pub fn space_mode(strategy: UpdateStrategy) -> SpaceMode {
    match strategy {
        UpdateStrategy::Parallel => SpaceMode::Parallel,
        UpdateStrategy::Sequential | UpdateStrategy::Disabled => SpaceMode::Sequential,
    }
}

/// Startup sequencing and scheduling around an [`Updater`]
pub struct Entrypoint {
    config: Config,
    updater: Arc<dyn Updater>,
    notifier: Arc<dyn Notifier>,
    regions: Arc<dyn RegionResolver>,
}

impl Entrypoint {
    /// Create an entrypoint
    pub fn new(
        config: Config,
        updater: Arc<dyn Updater>,
        notifier: Arc<dyn Notifier>,
        regions: Arc<dyn RegionResolver>,
    ) -> Self {
        Self {
            config,
            updater,
            notifier,
            regions,
        }
    }

    /// Check everything that can be checked before touching the network
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.config.download.file_url.is_none()
            && let Some(region) = &self.config.download.region
        {
            self.regions.resolve(region)?;
        }
        Ok(())
    }

    /// Decide what startup should do, based on configuration and the data dir
    pub fn startup_action(&self) -> StartupAction {
        if self.config.force_update {
            StartupAction::ForcedUpdate(space_mode(self.config.strategy))
        } else if !self.config.paths.node_dir().is_dir() {
            if self.config.initial_download {
                StartupAction::InitialDownload
            } else {
                StartupAction::SkipInitialDownload
            }
        } else {
            StartupAction::IndexPresent
        }
    }

    /// Run the startup sequence and return the process exit code
    pub async fn startup(&self) -> u8 {
        self.notifier.send("photon-updater initializing").await;
        self.log_config();

        if let Err(e) = self.validate() {
            tracing::error!(error = %e, "Stopping due to invalid configuration");
            return EXIT_FAILURE;
        }

        match self.startup_action() {
            StartupAction::ForcedUpdate(mode) => {
                tracing::info!("Starting forced update");
                self.run_update(mode, "force update").await
            }
            StartupAction::InitialDownload => {
                tracing::info!("Starting initial download using sequential strategy");
                tracing::info!("Note: Initial download will use sequential strategy regardless of config setting");
                self.run_update(SpaceMode::Sequential, "initial download").await
            }
            StartupAction::SkipInitialDownload => {
                tracing::warn!("Initial download is disabled but no existing Photon index was found");
                EXIT_SUCCESS
            }
            StartupAction::IndexPresent => {
                tracing::info!("Existing index found, skipping download");
                EXIT_SUCCESS
            }
        }
    }

    /// Run startup, then scheduled updates until `shutdown` resolves
    ///
    /// Returns the startup exit code if startup failed. Scheduled failures are
    /// logged and notified and the loop keeps going; on shutdown the exit code
    /// of the most recent scheduled update is returned, so a run that last
    /// failed for lack of disk space still exits with 75.
    pub async fn run_scheduled<S>(&self, shutdown: S) -> u8
    where
        S: Future<Output = ()>,
    {
        let code = self.startup().await;
        if code != EXIT_SUCCESS {
            return code;
        }

        if self.config.strategy == UpdateStrategy::Disabled {
            tracing::info!("Update strategy is DISABLED, no scheduled updates");
            return EXIT_SUCCESS;
        }

        let interval = match self.config.update_interval() {
            Ok(interval) => interval,
            Err(e) => {
                tracing::error!(error = %e, "Stopping due to invalid configuration");
                return EXIT_FAILURE;
            }
        };

        self.schedule(interval, shutdown).await
    }

    async fn schedule<S>(&self, interval: Duration, shutdown: S) -> u8
    where
        S: Future<Output = ()>,
    {
        let mode = space_mode(self.config.strategy);
        tokio::pin!(shutdown);
        let mut last_code = EXIT_SUCCESS;

        loop {
            tracing::info!(
                interval_secs = interval.as_secs(),
                "Next update in {}",
                self.config.update_interval
            );

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(exit_code = last_code, "Shutdown requested, stopping scheduler");
                    return last_code;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            tracing::info!("Starting scheduled update");
            last_code = self.run_update(mode, "scheduled update").await;
        }
    }

    async fn run_update(&self, mode: SpaceMode, what: &str) -> u8 {
        match self.updater.update(mode).await {
            Ok(report) => {
                self.notifier
                    .send(&format!("Photon index updated from {}", report.archive_url))
                    .await;
                EXIT_SUCCESS
            }
            Err(e @ Error::InsufficientSpace { .. }) => {
                tracing::error!("Cannot proceed with {}: {}", what, e);
                self.notifier
                    .send(&format!("photon-updater {what} failed: {e}"))
                    .await;
                e.exit_code()
            }
            Err(e) => {
                tracing::error!(error_code = e.error_code(), "FATAL: Update process failed with an error: {}", e);
                tracing::error!("Aborting.");
                self.notifier
                    .send(&format!("photon-updater {what} failed: {e}"))
                    .await;
                e.exit_code()
            }
        }
    }

    fn log_config(&self) {
        let c = &self.config;
        tracing::info!("=== CONFIG VARIABLES ===");
        tracing::info!("UPDATE_STRATEGY: {}", c.strategy.as_str());
        tracing::info!("UPDATE_INTERVAL: {}", c.update_interval);
        tracing::info!("REGION: {}", c.download.region.as_deref().unwrap_or("None"));
        tracing::info!("FORCE_UPDATE: {}", c.force_update);
        tracing::info!("DOWNLOAD_MAX_RETRIES: {}", c.retry.max_attempts);
        // May embed basic-auth credentials
        tracing::debug!("FILE_URL: {}", c.download.file_url.as_deref().unwrap_or("None"));
        tracing::info!("LOG_LEVEL: {}", c.log_level);
        tracing::info!("BASE_URL: {}", c.download.base_url);
        tracing::info!("SKIP_MD5_CHECK: {}", c.download.skip_checksum);
        tracing::info!("INITIAL_DOWNLOAD: {}", c.initial_download);
        tracing::info!("DATA_DIR: {}", c.paths.data_dir.display());
        tracing::info!("NOTIFY_URLS: {} configured", c.notifications.webhook_urls.len());
        tracing::info!("=== END CONFIG VARIABLES ===");
    }
}

/// Resolves once the process is asked to stop
///
/// - **Unix:** SIGTERM (container stop) or SIGINT, falling back to whichever
///   handler could be registered.
/// - **Other platforms:** Ctrl+C.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted sandboxes
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(_), Err(_)) => {
            tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Resolves once the process is asked to stop
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
