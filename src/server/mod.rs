//! Process shell: listeners, scheduler task and graceful shutdown

mod ws;

pub use ws::{classify, router as ws_router, WsSink, WsState};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::health::{self, AppState};
use crate::metrics::SyncMetrics;
use crate::registry::Registry;
use crate::scheduler::{BroadcastScheduler, SchedulerSettings};

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Bound gateway, ready to serve
pub struct SyncServer {
    config: SyncConfig,
    registry: Arc<Registry>,
    metrics: SyncMetrics,
    ws_listener: TcpListener,
    http_listener: TcpListener,
    ws_addr: SocketAddr,
    http_addr: SocketAddr,
}

async fn bind(port: u16) -> Result<(TcpListener, SocketAddr), SyncError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| SyncError::Bind { addr, source })?;
    let local = listener
        .local_addr()
        .map_err(|source| SyncError::Bind { addr, source })?;
    Ok((listener, local))
}

impl SyncServer {
    /// Seed the shard pool and bind both listeners
    pub async fn bind(config: SyncConfig, metrics: SyncMetrics) -> Result<Self, SyncError> {
        config.validate()?;

        let registry = Arc::new(Registry::new(config.shards, config.shard_assignment));
        let (ws_listener, ws_addr) = bind(config.port).await?;
        let (http_listener, http_addr) = bind(config.http_port).await?;

        info!(%ws_addr, %http_addr, "Listeners bound");

        Ok(Self {
            config,
            registry,
            metrics,
            ws_listener,
            http_listener,
            ws_addr,
            http_addr,
        })
    }

    /// Address of the WebSocket listener
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Address of the health/metrics listener
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Shared connection registry
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Serve until `shutdown_signal` resolves or a listener fails.
    ///
    /// On shutdown the scheduler finishes any tick in progress, both
    /// listeners stop accepting, and every held session is sent a Close frame.
    pub async fn run<F>(self, shutdown_signal: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let scheduler = if self.config.only_test_connect {
            info!("Connectivity test mode - broadcast scheduler disabled");
            None
        } else {
            let scheduler = BroadcastScheduler::new(
                Arc::clone(&self.registry),
                SchedulerSettings::from(&self.config),
                self.metrics.clone(),
            );
            Some(tokio::spawn(scheduler.run(shutdown_tx.subscribe())))
        };

        let ws_app = ws::router(WsState {
            registry: Arc::clone(&self.registry),
            metrics: self.metrics.clone(),
            shutdown: shutdown_tx.clone(),
        });
        let health_app = health::router(AppState {
            registry: Arc::clone(&self.registry),
            threshold: self.config.threshold,
            broadcasting: !self.config.only_test_connect,
            metrics: self.metrics.clone(),
        });

        let ws_server = axum::serve(self.ws_listener, ws_app)
            .with_graceful_shutdown(wait_for(shutdown_tx.subscribe()));
        let http_server = axum::serve(self.http_listener, health_app)
            .with_graceful_shutdown(wait_for(shutdown_tx.subscribe()));

        let trigger = {
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                shutdown_signal.await;
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
            })
        };

        info!(
            port = self.ws_addr.port(),
            http_port = self.http_addr.port(),
            "Accepting connections"
        );

        let result = tokio::try_join!(ws_server.into_future(), http_server.into_future())
            .map(|_| ())
            .map_err(SyncError::Serve);

        if let Err(ref e) = result {
            error!(error = %e, "Server error");
            self.metrics.record_error(e);
        }

        // Covers the listener-failure path; harmless if already sent
        let _ = shutdown_tx.send(());
        trigger.abort();

        if let Some(handle) = scheduler {
            let _ = handle.await;
        }

        info!(
            remaining = self.registry.total_count(),
            "Gateway stopped"
        );
        result
    }
}

async fn wait_for(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}
