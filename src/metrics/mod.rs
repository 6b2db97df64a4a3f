//! Prometheus metrics module
//!
//! Recording goes through the `metrics` facade, so a detached instance (no
//! recorder installed) is a silent no-op.

use crate::error::SyncError;
use crate::lifecycle::SessionEnd;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone)]
pub struct SyncMetrics {
    handle: Option<Arc<PrometheusHandle>>,
}

impl SyncMetrics {
    /// Install the global Prometheus recorder. Once per process.
    pub fn install() -> Result<Self, SyncError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| SyncError::MetricsInstall(e.to_string()))?;

        Self::register_metrics();

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }

    /// Metrics that are recorded into whatever recorder is current (usually none)
    pub fn detached() -> Self {
        Self { handle: None }
    }

    fn register_metrics() {
        describe_counter!(
            "sync_connections_opened_total",
            Unit::Count,
            "Client connections accepted"
        );
        describe_counter!(
            "sync_connections_closed_total",
            Unit::Count,
            "Client connections ended, by reason"
        );
        describe_gauge!(
            "sync_connections_active",
            Unit::Count,
            "Registered connections at the last scheduler tick"
        );
        describe_counter!(
            "sync_broadcasts_total",
            Unit::Count,
            "Ticks that fanned out a timestamp"
        );
        describe_counter!(
            "sync_broadcast_sends_total",
            Unit::Count,
            "Timestamp messages delivered"
        );
        describe_counter!(
            "sync_broadcast_send_failures_total",
            Unit::Count,
            "Timestamp messages that failed or timed out"
        );
        describe_histogram!(
            "sync_broadcast_duration_seconds",
            Unit::Seconds,
            "Wall time of one full fan-out"
        );
        describe_counter!("sync_errors_total", Unit::Count, "Gateway errors by type");
    }

    /// Record an accepted connection
    pub fn record_connection_opened(&self) {
        counter!("sync_connections_opened_total").increment(1);
    }

    /// Record a finished session
    pub fn record_connection_closed(&self, reason: SessionEnd) {
        counter!("sync_connections_closed_total", "reason" => reason.label()).increment(1);
    }

    /// Set registered connection count
    pub fn set_active_connections(&self, count: usize) {
        gauge!("sync_connections_active").set(count as f64);
    }

    /// Record a completed fan-out
    pub fn record_broadcast(&self, delivered: usize, failed: usize, duration: Duration) {
        counter!("sync_broadcasts_total").increment(1);
        counter!("sync_broadcast_sends_total").increment(delivered as u64);
        counter!("sync_broadcast_send_failures_total").increment(failed as u64);
        histogram!("sync_broadcast_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record gateway error
    pub fn record_error(&self, error: &SyncError) {
        counter!("sync_errors_total", "error_type" => error.error_type_label()).increment(1);
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::detached()
    }
}
