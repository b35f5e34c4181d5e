//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, feed status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (history seeded and feed connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::MarketTradeBroker;
use crate::infrastructure::broadcast::SharedTradeBroadcastHub;
use crate::infrastructure::feed::{ConnectionState, FeedState, FeedStatus};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::websocket::StreamServerState;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Exchange and pair served.
    pub market: String,
    /// Upstream feed connection.
    pub feed: FeedStatus,
    /// Trade log and distribution counters.
    pub trades: TradesStatus,
    /// Stream subscribers.
    pub stream: StreamStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Seeded and streaming.
    Healthy,
    /// Seeding, or the feed is reconnecting.
    Degraded,
    /// The feed gave up.
    Unhealthy,
}

/// Trade log and distribution counters.
#[derive(Debug, Clone, Serialize)]
pub struct TradesStatus {
    /// Whether startup seeding finished and live trades flow.
    pub live: bool,
    /// Trades currently held in memory.
    pub log_len: usize,
    /// Live trades appended.
    pub live_trades: u64,
    /// Gateway replay trades appended.
    pub replay_trades: u64,
    /// Trades seeded from persisted history.
    pub seeded: u64,
    /// Raw events dropped before reaching the log.
    pub dropped: u64,
    /// Observer callbacks that failed.
    pub observer_failures: u64,
}

/// Stream subscriber information.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Connected WebSocket clients.
    pub clients: usize,
    /// Total broadcast receivers.
    pub broadcast_receivers: usize,
    /// Trades published.
    pub published: u64,
    /// Snapshots handed out.
    pub snapshots_served: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: Arc<FeedState>,
    broker: Arc<MarketTradeBroker>,
    hub: SharedTradeBroadcastHub,
    stream: Arc<StreamServerState>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feed: Arc<FeedState>,
        broker: Arc<MarketTradeBroker>,
        hub: SharedTradeBroadcastHub,
        stream: Arc<StreamServerState>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            broker,
            hub,
            stream,
        }
    }

    fn is_ready(&self) -> bool {
        self.broker.is_live() && self.feed.is_connected()
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Build the health router.
    #[must_use]
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.status();
    let broker = state.broker.stats();
    let broadcast = state.hub.stats();
    let live = state.broker.is_live();

    HealthResponse {
        status: determine_health_status(feed.state, live),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        market: format!("{}:{}", state.broker.exchange(), state.broker.pair()),
        feed,
        trades: TradesStatus {
            live,
            log_len: broker.log_len,
            live_trades: broker.live_trades,
            replay_trades: broker.replay_trades,
            seeded: broker.seeded,
            dropped: broker.dropped,
            observer_failures: broker.observer_failures,
        },
        stream: StreamStatus {
            clients: state.stream.client_count(),
            broadcast_receivers: broadcast.receivers,
            published: broadcast.published,
            snapshots_served: broadcast.snapshots_served,
        },
    }
}

fn determine_health_status(feed: ConnectionState, live: bool) -> HealthStatus {
    match (feed, live) {
        (ConnectionState::Error, _) => HealthStatus::Unhealthy,
        (ConnectionState::Connected, true) => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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
