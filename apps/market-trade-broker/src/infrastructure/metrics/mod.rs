//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Trades**: received by origin, dropped by reason, history seeded
//! - **Distribution**: broadcast deliveries, observer failures, lagged clients
//! - **Persistence**: write failures and write latency per collection
//! - **Connections**: feed connection state, reconnects, stream clients
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder, so
//! tests can exercise instrumented code without any setup.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns [`BuildError`] if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Trade counters
    describe_counter!(
        "market_trades_received_total",
        "Raw trade events received from the feed, by origin"
    );
    describe_counter!(
        "market_trades_dropped_total",
        "Raw trade events dropped before reaching the log, by reason"
    );
    describe_counter!(
        "market_trades_history_seeded_total",
        "Trades seeded into the log from persisted history"
    );
    describe_gauge!(
        "market_trades_log_size",
        "Number of trades currently held in the in-memory log"
    );

    // Distribution
    describe_counter!(
        "market_trades_broadcast_deliveries_total",
        "Trades queued for remote subscribers"
    );
    describe_counter!(
        "market_trades_observer_failures_total",
        "Observer callbacks that failed or panicked"
    );
    describe_counter!(
        "market_trades_snapshots_served_total",
        "Snapshots handed to new subscribers"
    );
    describe_counter!(
        "market_trades_lagged_total",
        "Trades skipped by subscribers that fell behind"
    );
    describe_gauge!(
        "market_trades_stream_clients",
        "Number of connected stream clients"
    );

    // Persistence
    describe_counter!(
        "market_trades_persist_failures_total",
        "Failed durable writes, by collection"
    );
    describe_histogram!(
        "market_trades_persist_seconds",
        "Durable write latency, by collection"
    );

    // Feed
    describe_counter!(
        "market_trades_feed_messages_total",
        "Messages decoded from the exchange feed, by kind"
    );
    describe_counter!(
        "market_trades_feed_reconnects_total",
        "Exchange feed reconnection attempts"
    );
    describe_gauge!(
        "market_trades_feed_connected",
        "1 when the exchange feed is connected"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Where a raw trade event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOrigin {
    /// Live print.
    Live,
    /// Gateway startup replay print.
    Replay,
}

impl TradeOrigin {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }
}

/// Feed message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMessageKind {
    /// Trade print.
    Trade,
    /// Top-of-book update.
    Book,
    /// Control or informational message.
    Control,
}

impl FeedMessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Book => "book",
            Self::Control => "control",
        }
    }
}

/// Record a raw trade event received from the feed.
pub fn record_trade_received(origin: TradeOrigin) {
    counter!("market_trades_received_total", "origin" => origin.as_str()).increment(1);
}

/// Record a raw trade event dropped before reaching the log.
pub fn record_trade_dropped(reason: &'static str) {
    counter!("market_trades_dropped_total", "reason" => reason).increment(1);
}

/// Record trades seeded from persisted history.
pub fn record_history_seeded(count: usize) {
    counter!("market_trades_history_seeded_total").increment(count as u64);
}

/// Update the trade log size.
#[allow(clippy::cast_precision_loss)]
pub fn set_trade_log_size(len: usize) {
    gauge!("market_trades_log_size").set(len as f64);
}

/// Record how many subscribers a trade was queued for.
pub fn record_broadcast(delivered: usize) {
    counter!("market_trades_broadcast_deliveries_total").increment(delivered as u64);
}

/// Record an observer failure.
pub fn record_observer_failure(observer: &str) {
    counter!(
        "market_trades_observer_failures_total",
        "observer" => observer.to_string()
    )
    .increment(1);
}

/// Record a snapshot handed to a new subscriber.
pub fn record_snapshot_served() {
    counter!("market_trades_snapshots_served_total").increment(1);
}

/// Record trades skipped by a lagging subscriber.
pub fn record_lagged(skipped: u64) {
    counter!("market_trades_lagged_total").increment(skipped);
}

/// Update the stream client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_stream_clients(count: usize) {
    gauge!("market_trades_stream_clients").set(count as f64);
}

/// Record a failed durable write.
pub fn record_persist_failure(collection: &str) {
    counter!(
        "market_trades_persist_failures_total",
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// Record durable write latency.
pub fn record_persist_duration(collection: &str, duration: Duration) {
    histogram!(
        "market_trades_persist_seconds",
        "collection" => collection.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a message decoded from the exchange feed.
pub fn record_feed_message(kind: FeedMessageKind) {
    counter!("market_trades_feed_messages_total", "kind" => kind.as_str()).increment(1);
}

/// Record an exchange feed reconnection attempt.
pub fn record_feed_reconnect() {
    counter!("market_trades_feed_reconnects_total").increment(1);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("market_trades_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_origin_as_str() {
        assert_eq!(TradeOrigin::Live.as_str(), "live");
        assert_eq!(TradeOrigin::Replay.as_str(), "replay");
    }

    #[test]
    fn feed_message_kind_as_str() {
        assert_eq!(FeedMessageKind::Trade.as_str(), "trade");
        assert_eq!(FeedMessageKind::Book.as_str(), "book");
        assert_eq!(FeedMessageKind::Control.as_str(), "control");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_trade_received(TradeOrigin::Live);
        record_persist_duration("mt", Duration::from_millis(3));
        set_feed_connected(true);
    }
}
