//! CLI entry point for the AutoTranscode daemon.
//!
//! Loads settings, restores persisted watch jobs, starts the status server
//! and runs until interrupted.

use autotranscode::{
    effective_encode_slots, run_status_server, FfmpegLocator, Supervisor, TranscodeExecutor,
};
use autotranscode_config::{paths, JobStore, JsonJobStore, Settings};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// AutoTranscode - watch-folder media transcoding daemon
#[derive(Parser, Debug)]
#[command(name = "autotranscode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory (settings.toml, jobs.json, job state).
    /// Defaults to the platform config dir.
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Override the status server listen address (host:port)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_dir = args.config_dir.unwrap_or_else(paths::default_config_dir);
    info!(config_dir = %config_dir.display(), "autotranscode starting");

    let settings = match Settings::load(paths::settings_file(&config_dir)) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "failed to load settings");
            return ExitCode::FAILURE;
        }
    };

    let listen = args.listen.unwrap_or_else(|| settings.status.listen_addr.clone());
    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(_) => {
            error!(listen, "invalid status listen address");
            return ExitCode::FAILURE;
        }
    };

    let locator = Arc::new(FfmpegLocator::new(settings.encoder.bin_dir.clone()));
    match locator.locate() {
        Ok(path) => info!(ffmpeg = %path.display(), "encoder located"),
        // Not fatal: jobs report EncoderUnavailable and retry once ffmpeg
        // appears.
        Err(e) => warn!(error = %e, "encoder not found at startup"),
    }

    let slots = effective_encode_slots(settings.encoder.max_concurrent_encodes as usize);
    info!(slots, "encode slots");
    let executor = Arc::new(TranscodeExecutor::new(slots, locator));

    let store: Arc<dyn JobStore> = Arc::new(JsonJobStore::new(&config_dir));
    let supervisor = Arc::new(Supervisor::new(
        store,
        executor.clone(),
        paths::state_dir(&config_dir),
        Duration::from_secs(settings.watch.stability_window_secs),
        settings.encoder.max_in_flight_per_job as usize,
    ));

    match supervisor.restore().await {
        Ok(report) => {
            info!(started = report.started, "watch jobs restored");
            for (name, reason) in &report.skipped {
                warn!(job = %name, reason = %reason, "persisted job not started");
            }
        }
        Err(e) => {
            error!(error = %e, "failed to restore jobs");
            return ExitCode::FAILURE;
        }
    }

    let server_supervisor = supervisor.clone();
    let server_executor = executor.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = run_status_server(server_supervisor, server_executor, addr).await {
            error!(error = %e, "status server exited");
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return ExitCode::FAILURE;
    }

    info!("shutting down");
    supervisor.stop_all().await;
    server.abort();
    ExitCode::SUCCESS
}
