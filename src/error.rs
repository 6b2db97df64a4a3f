//! Domain error types for the clock sync gateway
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, SyncError>.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::registry::ConnectionId;

/// Gateway domain errors
///
/// Every variant carries structured context fields so a log line or a
/// metric label is enough to tell the failure modes apart.
///
/// Example log output:
/// ```text
/// SyncError::SendTimedOut { connection_id: 6f1c…, timeout: 5s }
/// → "send to connection 6f1c… timed out after 5s"
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration value missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration sources could not be read or deserialized
    #[error("failed to load configuration")]
    ConfigLoad(#[source] config::ConfigError),

    /// A duration field could not be parsed (expects "500ms", "10m", ...)
    #[error("invalid duration for '{field}': {value:?}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    /// Listener could not be bound
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// HTTP/WebSocket server terminated with an I/O error
    #[error("server error")]
    Serve(#[source] std::io::Error),

    /// Writing to a client connection failed
    #[error("send to connection {connection_id} failed")]
    SendFailed {
        connection_id: ConnectionId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Writing to a client connection did not complete in time
    #[error("send to connection {connection_id} timed out after {timeout:?}")]
    SendTimedOut {
        connection_id: ConnectionId,
        timeout: Duration,
    },

    /// Connection was already observed as closed
    #[error("connection {connection_id} is closed")]
    ConnectionClosed { connection_id: ConnectionId },

    /// Prometheus recorder could not be installed
    #[error("failed to install metrics recorder: {0}")]
    MetricsInstall(String),
}

impl SyncError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on the `sync_errors_total` counter.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ConfigLoad(_) => "config_load",
            Self::InvalidDuration { .. } => "invalid_duration",
            Self::Bind { .. } => "bind",
            Self::Serve(_) => "serve",
            Self::SendFailed { .. } => "send_failed",
            Self::SendTimedOut { .. } => "send_timeout",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::MetricsInstall(_) => "metrics_install",
        }
    }
}
