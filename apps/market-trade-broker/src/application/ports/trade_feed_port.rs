//! Trade Feed Port (Driver Port)
//!
//! The exchange gateway's live trade stream. Each raw event is delivered
//! exactly once, in arrival order, to the single subscriber, together with
//! the quote and book state sampled when it arrived.

use tokio::sync::mpsc;

use crate::domain::trade::TradeArrival;

/// Receiving half of a trade feed subscription.
pub type TradeEventReceiver = mpsc::Receiver<TradeArrival>;

/// Trade feed errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The feed already handed out its subscription.
    #[error("trade feed already has a subscriber")]
    AlreadySubscribed,

    /// The feed has shut down.
    #[error("trade feed closed")]
    Closed,
}

/// Port for subscribing to raw trade prints.
pub trait TradeFeed: Send + Sync {
    /// Subscribe to the live trade stream.
    ///
    /// Subscription is synchronous: events published after this call are
    /// buffered in the returned receiver until it is drained.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the feed cannot hand out a subscription.
    fn subscribe(&self) -> Result<TradeEventReceiver, FeedError>;
}
