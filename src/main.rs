//! Clock Sync Gateway binary
//!
//! Loads configuration, installs logging and metrics, then serves until
//! SIGINT/SIGTERM.

use anyhow::Result;
use clock_sync_gateway::metrics::SyncMetrics;
use clock_sync_gateway::{SyncConfig, SyncServer};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = SyncConfig::load(None)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("clock_sync_gateway={}", config.log_level).parse()?)
                .add_directive("hyper=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        http_port = config.http_port,
        threshold = config.threshold,
        shards = config.shards,
        only_test_connect = config.only_test_connect,
        "Starting Clock Sync Gateway"
    );

    let metrics = SyncMetrics::install()?;
    info!("Prometheus metrics initialized");

    let server = SyncServer::bind(config, metrics).await?;
    server.run(shutdown_signal()).await?;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
