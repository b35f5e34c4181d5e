//! Trade Publisher Port (Driven Port)
//!
//! The fan-out transport enriched trades are broadcast on. The broker is
//! both a publisher to it and the owner of the snapshot logic it calls back
//! into when a new remote subscriber connects.

use std::sync::Arc;

use crate::domain::trade::EnrichedTrade;

/// Callback returning the recent history a new subscriber starts from.
pub type SnapshotProvider = Arc<dyn Fn() -> Vec<EnrichedTrade> + Send + Sync>;

/// Port for broadcasting enriched trades to remote subscribers.
pub trait TradePublisher: Send + Sync {
    /// Broadcast a trade to every connected subscriber.
    ///
    /// Returns the number of subscribers the trade was queued for. Never
    /// blocks on slow subscribers.
    fn publish(&self, trade: &EnrichedTrade) -> usize;

    /// Install the callback invoked once per new subscription.
    ///
    /// A later registration replaces the earlier one.
    fn register_snapshot_provider(&self, provider: SnapshotProvider);
}

/// Publisher that drops everything, for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTradePublisher;

impl TradePublisher for NoOpTradePublisher {
    fn publish(&self, _trade: &EnrichedTrade) -> usize {
        0
    }

    fn register_snapshot_provider(&self, _provider: SnapshotProvider) {}
}
