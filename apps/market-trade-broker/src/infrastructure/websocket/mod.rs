//! Trade Stream Server
//!
//! WebSocket endpoint serving enriched trades to remote subscribers.
//!
//! # Endpoint
//!
//! - `GET /trades` - WebSocket upgrade
//!
//! # Frames
//!
//! The first frame is the snapshot of recent trades, oldest first:
//!
//! ```json
//! {"type": "snapshot", "trades": [...]}
//! ```
//!
//! then one frame per live trade:
//!
//! ```json
//! {"type": "trade", "trade": {...}}
//! ```
//!
//! A client that falls behind the broadcast buffer skips the oldest trades
//! and is told how many with a `{"type": "lagged", "skipped": n}` frame; it
//! is not disconnected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::trade::EnrichedTrade;
use crate::infrastructure::broadcast::SharedTradeBroadcastHub;
use crate::infrastructure::metrics;

// =============================================================================
// Wire Messages
// =============================================================================

/// Frames sent to stream clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Recent trades, oldest first. Always the first frame.
    Snapshot {
        /// Snapshot contents.
        trades: Vec<EnrichedTrade>,
    },
    /// One live trade.
    Trade {
        /// The trade.
        trade: EnrichedTrade,
    },
    /// The client fell behind and missed trades.
    Lagged {
        /// Number of trades skipped.
        skipped: u64,
    },
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the stream server.
#[derive(Debug)]
pub struct StreamServerState {
    hub: SharedTradeBroadcastHub,
    clients: AtomicUsize,
    cancel: CancellationToken,
}

impl StreamServerState {
    /// Create stream server state.
    #[must_use]
    pub const fn new(hub: SharedTradeBroadcastHub, cancel: CancellationToken) -> Self {
        Self {
            hub,
            clients: AtomicUsize::new(0),
            cancel,
        }
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    fn client_connected(&self) -> usize {
        let count = self.clients.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_stream_clients(count);
        count
    }

    fn client_disconnected(&self) -> usize {
        let count = self.clients.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::set_stream_clients(count);
        count
    }
}

// =============================================================================
// Server
// =============================================================================

/// WebSocket server for the trade stream.
#[derive(Debug)]
pub struct TradeStreamServer {
    port: u16,
    state: Arc<StreamServerState>,
}

impl TradeStreamServer {
    /// Create a new stream server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<StreamServerState>) -> Self {
        Self { port, state }
    }

    /// Build the router serving `/trades`.
    #[must_use]
    pub fn router(state: Arc<StreamServerState>) -> Router {
        Router::new()
            .route("/trades", get(trades_handler))
            .with_state(state)
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StreamServerError` if binding fails or the server fails.
    pub async fn run(self) -> Result<(), StreamServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StreamServerError::BindFailed(self.port, e.to_string()))?;
        Self::serve(listener, self.state).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StreamServerError::ServerFailed` if the server fails.
    pub async fn serve(
        listener: TcpListener,
        state: Arc<StreamServerState>,
    ) -> Result<(), StreamServerError> {
        let cancel = state.cancel.clone();
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, "Trade stream server listening");

        axum::serve(listener, Self::router(state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| StreamServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Trade stream server stopped");
        Ok(())
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn trades_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<StreamServerState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<StreamServerState>) {
    let client_id = Uuid::new_v4();
    let clients = state.client_connected();
    tracing::info!(%client_id, clients, "Stream client connected");

    if let Err(e) = stream_trades(socket, &state).await {
        tracing::debug!(%client_id, error = %e, "Stream client send failed");
    }

    let clients = state.client_disconnected();
    tracing::info!(%client_id, clients, "Stream client disconnected");
}

async fn stream_trades(socket: WebSocket, state: &StreamServerState) -> Result<(), axum::Error> {
    let (mut sink, mut incoming) = socket.split();
    let mut subscription = state.hub.subscribe();

    sink.send(encode(&StreamMessage::Snapshot {
        trades: std::mem::take(&mut subscription.snapshot),
    }))
    .await?;

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            received = subscription.receiver.recv() => match received {
                Ok(trade) => sink.send(encode(&StreamMessage::Trade { trade })).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Stream client lagging, trades skipped");
                    metrics::record_lagged(skipped);
                    sink.send(encode(&StreamMessage::Lagged { skipped })).await?;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return Ok(()),
                Some(Ok(_)) => {}
            },
        }
    }
}

fn encode(message: &StreamMessage) -> Message {
    // Serializing these types cannot fail: all keys are strings.
    let json = serde_json::to_string(message).unwrap_or_default();
    Message::Text(Utf8Bytes::from(json))
}

// =============================================================================
// Errors
// =============================================================================

/// Stream server errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
