//! Broadcast Channel Adapter
//!
//! Implements trade distribution using a tokio broadcast channel for
//! efficient fan-out to multiple subscribers.
//!
//! # Architecture
//!
//! The `TradeBroadcastHub` is the broker's `TradePublisher`. Publishing is a
//! non-blocking channel send: a subscriber that falls more than `capacity`
//! trades behind skips the oldest ones instead of slowing the broker.
//!
//! New subscribers receive a snapshot of recent trades from the registered
//! snapshot provider. The live receiver is created before the snapshot is
//! taken, so a trade published in between shows up in both (at-least-once)
//! and none is lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::application::ports::{SnapshotProvider, TradePublisher};
use crate::domain::trade::EnrichedTrade;
use crate::infrastructure::metrics;

/// Default channel capacity.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the trade broadcast channel.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Trades buffered per subscriber before the oldest are skipped.
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A new subscriber's starting state.
#[derive(Debug)]
pub struct TradeSubscription {
    /// Recent trades, oldest first.
    pub snapshot: Vec<EnrichedTrade>,
    /// Live trades published after the receiver was created.
    pub receiver: broadcast::Receiver<EnrichedTrade>,
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Fan-out hub for enriched trades.
///
/// # Example
///
/// ```rust
/// use market_trade_broker::application::ports::TradePublisher;
/// use market_trade_broker::infrastructure::broadcast::{BroadcastConfig, TradeBroadcastHub};
///
/// let hub = TradeBroadcastHub::new(BroadcastConfig::default());
/// let subscription = hub.subscribe();
/// assert!(subscription.snapshot.is_empty());
/// assert_eq!(hub.receiver_count(), 1);
/// ```
pub struct TradeBroadcastHub {
    trades_tx: broadcast::Sender<EnrichedTrade>,
    snapshot_provider: RwLock<Option<SnapshotProvider>>,
    published: AtomicU64,
    snapshots_served: AtomicU64,
}

impl std::fmt::Debug for TradeBroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeBroadcastHub")
            .field("receivers", &self.trades_tx.receiver_count())
            .field("has_snapshot_provider", &self.snapshot_provider.read().is_some())
            .finish_non_exhaustive()
    }
}

impl TradeBroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            trades_tx: broadcast::channel(config.capacity.max(1)).0,
            snapshot_provider: RwLock::new(None),
            published: AtomicU64::new(0),
            snapshots_served: AtomicU64::new(0),
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Subscribe to live trades, starting from a snapshot of recent ones.
    ///
    /// The snapshot is empty until a snapshot provider is registered.
    #[must_use]
    pub fn subscribe(&self) -> TradeSubscription {
        let receiver = self.trades_tx.subscribe();

        let provider = self.snapshot_provider.read().clone();
        let snapshot = provider.map_or_else(Vec::new, |provider| provider());

        self.snapshots_served.fetch_add(1, Ordering::Relaxed);
        metrics::record_snapshot_served();

        TradeSubscription { snapshot, receiver }
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.trades_tx.receiver_count()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            receivers: self.receiver_count(),
            published: self.published.load(Ordering::Relaxed),
            snapshots_served: self.snapshots_served.load(Ordering::Relaxed),
        }
    }
}

impl TradePublisher for TradeBroadcastHub {
    fn publish(&self, trade: &EnrichedTrade) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        // Err only means nobody is listening.
        self.trades_tx.send(trade.clone()).unwrap_or(0)
    }

    fn register_snapshot_provider(&self, provider: SnapshotProvider) {
        *self.snapshot_provider.write() = Some(provider);
    }
}

/// Shared broadcast hub reference.
pub type SharedTradeBroadcastHub = Arc<TradeBroadcastHub>;

/// Statistics about the broadcast channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Number of live receivers.
    pub receivers: usize,
    /// Trades published.
    pub published: u64,
    /// Snapshots handed to new subscribers.
    pub snapshots_served: u64,
}

// =============================================================================
// Tests
// =============================================================================
