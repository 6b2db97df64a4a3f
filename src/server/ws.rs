//! WebSocket acceptor
//!
//! Upgrades `GET /` and hands the socket to the connection lifecycle.

use crate::lifecycle::{hold_connection, InboundFrame};
use crate::metrics::SyncMetrics;
use crate::registry::{Connection, MessageSink, Registry, SinkError};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

/// State shared by every upgraded socket
#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<Registry>,
    pub metrics: SyncMetrics,
    pub shutdown: broadcast::Sender<()>,
}

/// Create the WebSocket router
pub fn router(state: WsState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Outbound half of an upgraded socket
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&self, payload: String) -> Result<(), SinkError> {
        let mut guard = self.inner.lock().await;
        guard.send(Message::Text(payload.into())).await?;
        Ok(())
    }

    async fn close(&self) {
        let mut guard = self.inner.lock().await;
        let _ = guard.send(Message::Close(None)).await;
    }
}

/// Map a WebSocket message to the lifecycle's frame kinds
pub fn classify(message: &Message) -> InboundFrame {
    match message {
        Message::Text(_) => InboundFrame::Text,
        Message::Binary(_) => InboundFrame::Binary,
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Control,
        Message::Close(_) => InboundFrame::Close,
    }
}

/// Axum handler - upgrades HTTP to WebSocket. A failed upgrade only affects
/// this request.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_failed_upgrade(|e: axum::Error| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| run_socket(socket, state))
}

async fn run_socket(socket: WebSocket, state: WsState) {
    // Subscribe before registering so a shutdown cannot slip past this session
    let shutdown = state.shutdown.subscribe();
    let (tx, rx) = socket.split();
    let conn = Arc::new(Connection::new(WsSink::new(tx)));
    let inbound = rx.map(|message| message.map(|m| classify(&m)));

    hold_connection(&state.registry, conn, inbound, shutdown, &state.metrics).await;
}
