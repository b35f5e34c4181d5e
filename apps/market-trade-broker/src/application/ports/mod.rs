//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteProvider` / `BookProvider`: reads of quote and book state
//! - `TradePublisher`: fan-out transport to remote subscribers
//! - `DocumentStore`: durable storage
//!
//! ## Driver Ports (Inbound)
//!
//! - `TradeFeed`: the gateway's raw trade stream
//! - `TradeObserver`: in-process listeners for live trades

mod document_store_port;
mod market_state_port;
mod trade_feed_port;
mod trade_observer_port;
mod trade_publisher_port;

pub use document_store_port::{DocumentStore, StoreError, StoredDocument};
pub use market_state_port::{BookProvider, QuoteProvider};
#[cfg(test)]
pub use market_state_port::{MockBookProvider, MockQuoteProvider};
pub use trade_feed_port::{FeedError, TradeEventReceiver, TradeFeed};
pub use trade_observer_port::{ObserverError, TradeObserver};
pub use trade_publisher_port::{NoOpTradePublisher, SnapshotProvider, TradePublisher};
