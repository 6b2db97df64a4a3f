//! Timestamp fan-out
//!
//! Each shard is snapshotted under its lock, then sent to with no lock held.
//! Every send is its own timed future, so a failed or slow client only costs
//! its own send.

use crate::error::SyncError;
use crate::metrics::SyncMetrics;
use crate::registry::{Connection, Registry};

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Registered connections counted at the start of the tick
    pub total: usize,
    /// Messages written successfully
    pub delivered: usize,
    /// Messages that failed or timed out
    pub failed: usize,
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Send the current time to every active connection, shards concurrently
pub(crate) async fn broadcast_timestamp(
    registry: &Registry,
    total: usize,
    send_timeout: Duration,
    metrics: &SyncMetrics,
) -> BroadcastReport {
    let shards = registry
        .snapshot()
        .into_iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(shard, members)| send_to_shard(shard, members, send_timeout, metrics));

    join_all(shards).await.into_iter().fold(
        BroadcastReport {
            total,
            ..Default::default()
        },
        |mut report, (delivered, failed)| {
            report.delivered += delivered;
            report.failed += failed;
            report
        },
    )
}

async fn send_to_shard(
    shard: usize,
    members: Vec<Arc<Connection>>,
    send_timeout: Duration,
    metrics: &SyncMetrics,
) -> (usize, usize) {
    let sends = members
        .iter()
        .map(|conn| send_one(shard, conn, send_timeout, metrics));

    let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
    (delivered, members.len() - delivered)
}

async fn send_one(
    shard: usize,
    conn: &Connection,
    send_timeout: Duration,
    metrics: &SyncMetrics,
) -> bool {
    let payload = epoch_millis().to_string();

    let result = match tokio::time::timeout(send_timeout, conn.send_text(payload)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::SendTimedOut {
            connection_id: conn.id(),
            timeout: send_timeout,
        }),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            metrics.record_error(&e);
            // Skipped from now on; its read loop unregisters it
            if conn.mark_closed() {
                warn!(shard, connection_id = %conn.id(), error = %e, "Broadcast send failed");
            } else {
                debug!(shard, connection_id = %conn.id(), error = %e, "Send to closed connection");
            }
            false
        }
    }
}
