//! Backy2 Webhook - Main Entry Point
//! HTTP server + single backup worker

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use backy_api_http::HttpServer;
use backy_core::application::Orchestrator;
use backy_core::port::id_provider::UuidProvider;
use backy_core::port::time_provider::SystemTimeProvider;
use backy_infra_fs::FileMappingStore;
use backy_infra_system::ShellExecutor;
use config::Args;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_logging(args: &Args) -> Result<()> {
    let log_format = std::env::var("BACKY_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_directive()))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let args = Args::parse();
    init_logging(&args)?;

    info!("Backy2 webhook v{} starting...", VERSION);

    // 2. Mapping store (the only fatal startup failure)
    let ids_dir = args.ids_dir();
    info!(ids_dir = %ids_dir.display(), "Opening id mapping store...");
    let store = Arc::new(
        FileMappingStore::open(&ids_dir)
            .with_context(|| format!("Couldn't create ids dir {}", ids_dir.display()))?,
    );

    // 3. Setup dependencies (DI wiring)
    let executor = Arc::new(ShellExecutor::new(args.shell.clone()));
    let config = args.orchestrator_config();
    info!(
        source_path = %config.source_path,
        max_running_time_secs = %config.max_running_time.as_secs(),
        pre_backup_command = ?config.pre_backup_command,
        post_backup_command = ?config.post_backup_command,
        "Backup configuration loaded"
    );

    let (orchestrator, worker) = Orchestrator::new(
        config,
        executor,
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    );
    let orchestrator = Arc::new(orchestrator);

    // 4. Repository bootstrap
    info!("Checking backy2 repository...");
    if let Err(e) = orchestrator.ensure_repository().await {
        error!(error = %e, "backy2 repository is not usable; backups will fail until it is");
    }

    // 5. Start Worker
    info!("Starting backup worker...");
    let worker_handle = tokio::spawn(worker.run());

    // 6. Start HTTP server
    let server = HttpServer::new(args.http_config(), orchestrator.clone());
    let server_handle = server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server start failed: {}", e))?;

    info!(addr = %server_handle.local_addr(), "System ready. Waiting for requests...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    server_handle.stop();
    orchestrator.shutdown();

    if tokio::time::timeout(SHUTDOWN_GRACE, worker_handle)
        .await
        .is_err()
    {
        warn!("Backup worker did not stop in time");
    }
    match tokio::time::timeout(SHUTDOWN_GRACE, server_handle.stopped()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server stopped with error"),
        Err(_) => warn!("HTTP server did not stop in time"),
    }

    info!("Shutdown complete.");

    Ok(())
}
