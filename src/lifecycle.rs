//! Connection lifecycle
//!
//! Register on accept, hold the session open reading inbound frames, and
//! unregister from the same shard when it ends. Inbound text is read and
//! discarded; only presence matters.

use crate::metrics::SyncMetrics;
use crate::registry::{Connection, Registry};

use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Transport-neutral view of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text message, accepted and ignored
    Text,
    /// Binary message, not part of the protocol
    Binary,
    /// Ping/pong, answered by the transport
    Control,
    /// Close frame from the client
    Close,
}

/// Why a held session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Read failed (network error, reset)
    ReadError,
    /// Client closed the session or the stream ended
    RemoteClosed,
    /// Client sent a non-text message
    ProtocolViolation,
    /// Gateway is shutting down
    Shutdown,
}

impl SessionEnd {
    /// Static label for the `reason` metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReadError => "read_error",
            Self::RemoteClosed => "remote_closed",
            Self::ProtocolViolation => "protocol_violation",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Register `conn`, read from `inbound` until the session ends, then unregister.
///
/// Register happens before the first read, so it always happens-before the
/// matching unregister.
pub async fn hold_connection<S, E>(
    registry: &Registry,
    conn: Arc<Connection>,
    mut inbound: S,
    mut shutdown: broadcast::Receiver<()>,
    metrics: &SyncMetrics,
) -> SessionEnd
where
    S: Stream<Item = Result<InboundFrame, E>> + Unpin,
    E: Display,
{
    let connection_id = conn.id();
    let shard = registry.register(Arc::clone(&conn));
    metrics.record_connection_opened();
    debug!(%connection_id, shard, "Session started");

    let end = loop {
        tokio::select! {
            frame = inbound.next() => match frame {
                Some(Ok(InboundFrame::Text)) | Some(Ok(InboundFrame::Control)) => {}
                Some(Ok(InboundFrame::Binary)) => {
                    info!(%connection_id, "Wrong message type, closing session");
                    break SessionEnd::ProtocolViolation;
                }
                Some(Ok(InboundFrame::Close)) | None => break SessionEnd::RemoteClosed,
                Some(Err(e)) => {
                    debug!(%connection_id, error = %e, "Can't receive, closing session");
                    break SessionEnd::ReadError;
                }
            },
            _ = shutdown.recv() => {
                conn.close().await;
                break SessionEnd::Shutdown;
            }
        }
    };

    conn.mark_closed();
    registry.unregister(&conn, shard);
    metrics.record_connection_closed(end);
    debug!(
        %connection_id,
        shard,
        reason = end.label(),
        held_ms = conn.connected_at().elapsed().as_millis() as u64,
        "Session ended"
    );

    end
}
