//! Exchange Feed Gateway
//!
//! - `ChannelTradeFeed`: the in-process `TradeFeed` the broker subscribes to
//! - `FeedClient`: WebSocket client filling that feed and the book cell
//!   from the exchange's market data stream
//! - `ReconnectPolicy`: exponential backoff with jitter
//! - `FeedState`: connection state for health reporting

mod channel;
mod client;
mod codec;
pub mod messages;
mod reconnect;
mod state;

pub use channel::{ChannelTradeFeed, DEFAULT_FEED_CAPACITY, TradeSender};
pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, FeedCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{ConnectionState, FeedState, FeedStatus};
