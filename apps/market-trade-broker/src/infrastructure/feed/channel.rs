//! In-process trade feed.
//!
//! A bounded mpsc channel standing between whatever produces raw trades
//! (the exchange feed client, a test) and the broker. The channel's one
//! receiver is handed out on the first `subscribe`.
//!
//! Senders stamp each event with the quote and book before queueing it, so
//! the context reflects arrival time however long the event waits.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{FeedError, TradeEventReceiver, TradeFeed};
use crate::application::services::ContextSampler;
use crate::domain::trade::{RawTradeEvent, TradeArrival};

/// Default number of raw trades buffered ahead of the broker.
pub const DEFAULT_FEED_CAPACITY: usize = 4_096;

/// Sending half of a [`ChannelTradeFeed`].
#[derive(Debug, Clone)]
pub struct TradeSender {
    tx: mpsc::Sender<TradeArrival>,
    sampler: ContextSampler,
}

impl TradeSender {
    /// Sample the current context for `raw` and queue it, waiting for
    /// buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Closed`] if the subscriber has gone away.
    pub async fn send(&self, raw: RawTradeEvent) -> Result<(), FeedError> {
        let arrival = self.sampler.sample(raw);
        self.tx.send(arrival).await.map_err(|_| FeedError::Closed)
    }
}

/// Channel-backed `TradeFeed`.
#[derive(Debug)]
pub struct ChannelTradeFeed {
    sender: TradeSender,
    rx: Mutex<Option<TradeEventReceiver>>,
}

impl ChannelTradeFeed {
    /// Create a feed buffering up to `capacity` events, sampling context
    /// with `sampler`.
    #[must_use]
    pub fn new(capacity: usize, sampler: ContextSampler) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: TradeSender { tx, sampler },
            rx: Mutex::new(Some(rx)),
        }
    }

    /// A handle for pushing raw trades into the feed.
    #[must_use]
    pub fn sender(&self) -> TradeSender {
        self.sender.clone()
    }

    /// Push a raw trade, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Closed`] if the subscriber has gone away.
    pub async fn push(&self, event: RawTradeEvent) -> Result<(), FeedError> {
        self.sender.send(event).await
    }
}

impl TradeFeed for ChannelTradeFeed {
    fn subscribe(&self) -> Result<TradeEventReceiver, FeedError> {
        self.rx.lock().take().ok_or(FeedError::AlreadySubscribed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::trade::{BookTopSnapshot, PriceLevel};
    use crate::infrastructure::market_state::{LatestBook, LatestQuote};

    fn feed_over(book: &Arc<LatestBook>, capacity: usize) -> ChannelTradeFeed {
        ChannelTradeFeed::new(
            capacity,
            ContextSampler::new(Arc::new(LatestQuote::new()), Arc::clone(book) as _),
        )
    }

    #[tokio::test]
    async fn events_buffer_until_drained() {
        let book = Arc::new(LatestBook::new());
        let feed = feed_over(&book, 8);
        let mut rx = feed.subscribe().unwrap();

        let first = RawTradeEvent::replay(Decimal::ONE, Decimal::ONE, Utc::now());
        let second = RawTradeEvent::live(Decimal::TWO, Decimal::ONE, Utc::now());
        feed.push(first).await.unwrap();
        feed.sender().send(second).await.unwrap();

        assert_eq!(rx.recv().await.map(|a| a.raw), Some(first));
        assert_eq!(rx.recv().await.map(|a| a.raw), Some(second));
    }

    #[tokio::test]
    async fn queued_event_keeps_book_from_push_time() {
        let book = Arc::new(LatestBook::new());
        let feed = feed_over(&book, 8);
        let at_arrival = BookTopSnapshot {
            best_bid: Some(PriceLevel::new(Decimal::from(99), Decimal::ONE)),
            best_ask: None,
        };

        book.update(at_arrival);
        feed.push(RawTradeEvent::live(Decimal::ONE, Decimal::ONE, Utc::now()))
            .await
            .unwrap();
        book.update(BookTopSnapshot {
            best_bid: Some(PriceLevel::new(Decimal::from(200), Decimal::ONE)),
            best_ask: None,
        });

        let mut rx = feed.subscribe().unwrap();
        assert_eq!(rx.recv().await.unwrap().context.book, Some(at_arrival));
    }

    #[test]
    fn second_subscribe_is_rejected() {
        let feed = feed_over(&Arc::new(LatestBook::new()), DEFAULT_FEED_CAPACITY);
        let _rx = feed.subscribe().unwrap();
        assert_eq!(feed.subscribe().unwrap_err(), FeedError::AlreadySubscribed);
    }

    #[tokio::test]
    async fn push_after_subscriber_dropped_fails() {
        let feed = feed_over(&Arc::new(LatestBook::new()), 1);
        drop(feed.subscribe().unwrap());

        let result = feed
            .push(RawTradeEvent::live(Decimal::ONE, Decimal::ONE, Utc::now()))
            .await;
        assert_eq!(result, Err(FeedError::Closed));
    }
}
