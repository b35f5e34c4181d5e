//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the servers and
//! process-wide setup around them.

/// Broadcast hub distributing trades to stream subscribers.
pub mod broadcast;

/// Environment configuration.
pub mod config;

/// Exchange feed WebSocket client and in-process trade feed.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Latest quote and book-top cells.
pub mod market_state;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Document store adapters.
pub mod store;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;

/// WebSocket trade stream server.
pub mod websocket;
