//! Broadcast scheduler
//!
//! One background task that wakes on a fixed cadence, counts the registered
//! connections and, when the threshold is met, sends every client the current
//! time in milliseconds since the Unix epoch. There is no latch: every tick
//! that meets the threshold broadcasts again.

mod fanout;

pub use fanout::{epoch_millis, BroadcastReport};

use crate::config::SyncConfig;
use crate::metrics::SyncMetrics;
use crate::registry::Registry;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

/// Timing and threshold knobs for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub delay: Duration,
    pub interval: Duration,
    pub threshold: usize,
    pub send_timeout: Duration,
}

impl From<&SyncConfig> for SchedulerSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            delay: config.delay,
            interval: config.interval,
            threshold: config.threshold,
            send_timeout: config.send_timeout,
        }
    }
}

/// Result of one scheduler tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fewer than `threshold` connections; nothing was sent
    Waiting { total: usize },
    /// Threshold met; a timestamp was fanned out
    Broadcast(BroadcastReport),
}

/// Periodic threshold check and fan-out
pub struct BroadcastScheduler {
    registry: Arc<Registry>,
    settings: SchedulerSettings,
    metrics: SyncMetrics,
}

impl BroadcastScheduler {
    pub fn new(registry: Arc<Registry>, settings: SchedulerSettings, metrics: SyncMetrics) -> Self {
        Self {
            registry,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Evaluate the threshold once and broadcast if it is met
    pub async fn tick(&self) -> TickOutcome {
        let total = self.registry.total_count();
        self.metrics.set_active_connections(total);

        if total < self.settings.threshold {
            info!(
                connections = total,
                threshold = self.settings.threshold,
                "Below threshold, not broadcasting"
            );
            return TickOutcome::Waiting { total };
        }

        info!(
            connections = total,
            threshold = self.settings.threshold,
            "All clients are ready, sending timestamp to all"
        );

        let started = Instant::now();
        let report = fanout::broadcast_timestamp(
            &self.registry,
            total,
            self.settings.send_timeout,
            &self.metrics,
        )
        .await;
        let elapsed = started.elapsed();

        self.metrics
            .record_broadcast(report.delivered, report.failed, elapsed);

        info!(
            connections = total,
            delivered = report.delivered,
            failed = report.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Timestamp broadcast complete"
        );

        TickOutcome::Broadcast(report)
    }

    /// Tick after `delay`, then every `interval`, until shutdown is signalled.
    ///
    /// A tick in progress is allowed to finish before the loop exits.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.settings.delay, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            delay_ms = self.settings.delay.as_millis() as u64,
            interval_ms = self.settings.interval.as_millis() as u64,
            threshold = self.settings.threshold,
            "Broadcast scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Broadcast scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Broadcast scheduler stopped");
    }
}
