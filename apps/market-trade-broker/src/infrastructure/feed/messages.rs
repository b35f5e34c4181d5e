//! Exchange Feed Message Types
//!
//! Wire format of the exchange market data feed. Every message is a JSON
//! object carrying a `T` type discriminator; frames hold either one object
//! or an array of them.
//!
//! # Message Types
//!
//! ## Control
//! - `success`: connection acknowledgment
//! - `error`: error with code and description
//! - `subscription`: current subscriptions
//!
//! ## Market Data
//! - `t`: trade print, optionally flagged as a startup replay
//! - `b`: top-of-book update

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trade::{BookTopSnapshot, PriceLevel, RawTradeEvent};

// =============================================================================
// Control Messages
// =============================================================================

/// Connection acknowledgment.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Status text.
    pub msg: String,
}

/// Error reported by the feed.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 405, "msg": "symbol limit exceeded"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: i32,
    /// Error description.
    pub msg: String,
}

/// Subscription confirmation.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": ["BTC/USD"], "books": ["BTC/USD"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Pairs subscribed for trades.
    #[serde(default)]
    pub trades: Vec<String>,
    /// Pairs subscribed for book updates.
    #[serde(default)]
    pub books: Vec<String>,
}

// =============================================================================
// Market Data Messages
// =============================================================================

/// Trade print.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "t", "S": "BTC/USD", "p": "100.5", "s": "0.25", "t": "2024-03-01T12:00:00Z", "startup": false}
/// ```
///
/// `startup` marks historical prints the exchange replays right after a
/// connection is established. It defaults to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Pair, as `BASE/QUOTE`.
    #[serde(rename = "S")]
    pub pair: String,
    /// Trade price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade size.
    #[serde(rename = "s")]
    pub size: Decimal,
    /// Exchange timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Startup replay flag.
    #[serde(default)]
    pub startup: bool,
}

impl TradeMessage {
    /// Convert into a raw trade event.
    #[must_use]
    pub const fn to_raw(&self) -> RawTradeEvent {
        RawTradeEvent {
            price: self.price,
            size: self.size,
            time: self.timestamp,
            is_startup_replay: self.startup,
        }
    }
}

/// Top-of-book update. A side whose price or size is missing is empty.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "b", "S": "BTC/USD", "bp": "99.5", "bs": "3", "ap": "100.5", "as": "4"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTopMessage {
    /// Pair, as `BASE/QUOTE`.
    #[serde(rename = "S")]
    pub pair: String,
    /// Best bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: Option<Decimal>,
    /// Best bid size.
    #[serde(rename = "bs", default)]
    pub bid_size: Option<Decimal>,
    /// Best ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: Option<Decimal>,
    /// Best ask size.
    #[serde(rename = "as", default)]
    pub ask_size: Option<Decimal>,
}

impl BookTopMessage {
    /// Convert into a book top snapshot.
    #[must_use]
    pub fn to_snapshot(&self) -> BookTopSnapshot {
        BookTopSnapshot {
            best_bid: level(self.bid_price, self.bid_size),
            best_ask: level(self.ask_price, self.ask_size),
        }
    }
}

fn level(price: Option<Decimal>, size: Option<Decimal>) -> Option<PriceLevel> {
    match (price, size) {
        (Some(price), Some(size)) if !size.is_zero() => Some(PriceLevel::new(price, size)),
        _ => None,
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Subscribe request sent after connecting.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "trades": ["BTC/USD"], "books": ["BTC/USD"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Always `subscribe`.
    pub action: String,
    /// Pairs to receive trades for.
    pub trades: Vec<String>,
    /// Pairs to receive book updates for.
    pub books: Vec<String>,
}

impl SubscriptionRequest {
    /// Subscribe to trades and book updates for one pair.
    #[must_use]
    pub fn for_pair(pair: &str) -> Self {
        Self {
            action: "subscribe".to_string(),
            trades: vec![pair.to_string()],
            books: vec![pair.to_string()],
        }
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Unified Message
// =============================================================================

/// Any message the feed can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "T")]
pub enum FeedMessage {
    /// Connection acknowledgment.
    #[serde(rename = "success")]
    Success(SuccessMessage),
    /// Error.
    #[serde(rename = "error")]
    Error(ErrorMessage),
    /// Subscription confirmation.
    #[serde(rename = "subscription")]
    Subscription(SubscriptionMessage),
    /// Trade print.
    #[serde(rename = "t")]
    Trade(TradeMessage),
    /// Top-of-book update.
    #[serde(rename = "b")]
    BookTop(BookTopMessage),
}
