//! photon-updater binary: container entrypoint for Photon index refreshes.

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use photon_updater::config::log_directive;
use photon_updater::notify;
use photon_updater::transfer::ProgressCallback;
use photon_updater::{
    BuiltinRegions, Config, EXIT_FAILURE, Entrypoint, ToExitCode, UpdateOrchestrator,
    shutdown_signal,
};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Refresh the Photon geocoder index
#[derive(Debug, Parser)]
#[command(name = "photon-updater", version, about)]
struct Cli {
    /// Keep running and update every UPDATE_INTERVAL after startup
    #[arg(long)]
    schedule: bool,

    /// Update at startup even if an index exists (same as FORCE_UPDATE=true)
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging("INFO");
            tracing::error!(error = %e, "Stopping due to invalid configuration");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if cli.force {
        config.force_update = true;
    }

    init_logging(&config.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting photon-updater");

    let progress_bar = progress_bar();
    let progress = progress_bar.as_ref().map(|bar| {
        let bar = bar.clone();
        let callback: ProgressCallback = Arc::new(move |done, total| {
            if total > 0 {
                bar.set_length(total);
            }
            bar.set_position(done);
        });
        callback
    });

    let orchestrator = match UpdateOrchestrator::from_config(&config, progress) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, error_code = e.error_code(), "Failed to initialize updater");
            return ExitCode::from(e.exit_code());
        }
    };

    let notifier = notify::from_config(&config.notifications);
    let entrypoint = Entrypoint::new(
        config,
        Arc::new(orchestrator),
        notifier,
        Arc::new(BuiltinRegions),
    );

    let code = if cli.schedule {
        entrypoint.run_scheduled(shutdown_signal()).await
    } else {
        entrypoint.startup().await
    };

    if let Some(bar) = progress_bar {
        bar.finish_and_clear();
    }

    ExitCode::from(code)
}

fn init_logging(level: &str) {
    // RUST_LOG wins over LOG_LEVEL when set
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive(level))),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Byte progress bar, only when stderr is an interactive terminal
fn progress_bar() -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }

    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    Some(bar)
}
