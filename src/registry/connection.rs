//! Connection handles
//!
//! A `Connection` is the registry's view of one accepted client: an identity,
//! the outbound half of the socket and an Active/Closed flag.

use crate::error::SyncError;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// Unique identity of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport error surfaced by a [`MessageSink`]
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Outbound side of a client connection
///
/// Implemented by the WebSocket transport; tests plug in in-memory sinks.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one text message to the client
    async fn send_text(&self, payload: String) -> Result<(), SinkError>;

    /// Ask the client to close the session. Best effort.
    async fn close(&self) {}
}

/// Handle to one accepted client connection
pub struct Connection {
    id: ConnectionId,
    sink: Box<dyn MessageSink>,
    closed: AtomicBool,
    connected_at: Instant,
}

impl Connection {
    /// Wrap an outbound sink in a fresh, active connection handle
    pub fn new(sink: impl MessageSink + 'static) -> Self {
        Self {
            id: ConnectionId::new(),
            sink: Box::new(sink),
            closed: AtomicBool::new(false),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// When the connection was accepted
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Returns true once a write has failed or the session has ended
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Returns true if it was active before.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Send a text payload, refusing if the connection is already closed
    pub async fn send_text(&self, payload: String) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::ConnectionClosed {
                connection_id: self.id,
            });
        }
        self.sink
            .send_text(payload)
            .await
            .map_err(|source| SyncError::SendFailed {
                connection_id: self.id,
                source,
            })
    }

    /// Forward a close request to the sink
    pub async fn close(&self) {
        self.mark_closed();
        self.sink.close().await;
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    #[async_trait]
    impl MessageSink for NullSink {
        async fn send_text(&self, _payload: String) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Connection::new(NullSink);
        let b = Connection::new(NullSink);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_mark_closed_reports_transition_once() {
        let conn = Connection::new(NullSink);
        assert!(!conn.is_closed());
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_send_refused_after_close() {
        let conn = Connection::new(NullSink);
        tokio_test::assert_ok!(conn.send_text("1".to_string()).await);

        conn.mark_closed();
        let err = conn.send_text("2".to_string()).await.unwrap_err();
        assert_eq!(err.error_type_label(), "connection_closed");
    }

    struct BrokenSink;

    #[async_trait]
    impl MessageSink for BrokenSink {
        async fn send_text(&self, _payload: String) -> Result<(), SinkError> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone").into())
        }
    }

    #[tokio::test]
    async fn test_sink_error_is_wrapped_with_connection_id() {
        let conn = Connection::new(BrokenSink);
        let err = conn.send_text("1".to_string()).await.unwrap_err();
        assert_eq!(err.error_type_label(), "send_failed");
        assert!(err.to_string().contains(&conn.id().to_string()));
    }
}
