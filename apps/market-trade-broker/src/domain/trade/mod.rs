//! Market Trade Types
//!
//! Core domain types for the trade distribution path: the raw print as the
//! gateway reports it, the quote and book context it is enriched with, and
//! the enriched record that is distributed and persisted.
//!
//! These types are transport-agnostic. Prices and sizes are `Decimal` so no
//! precision is lost between the feed and the durable store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Market Identity
// =============================================================================

/// Exchange a trade was printed on.
///
/// Names are normalized to lower case so `Coinbase` and `coinbase` scope to
/// the same stored history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exchange(String);

impl Exchange {
    /// Create an exchange identifier.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// Get the normalized exchange name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A traded currency pair, e.g. `BTC/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency.
    pub base: String,
    /// Quote currency.
    pub quote: String,
}

impl CurrencyPair {
    /// Create a currency pair. Both legs are upper-cased.
    #[must_use]
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim().to_uppercase(),
            quote: quote.as_ref().trim().to_uppercase(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Error parsing a `BASE/QUOTE` pair string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid currency pair '{0}', expected BASE/QUOTE")]
pub struct PairParseError(pub String);

impl FromStr for CurrencyPair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ => Err(PairParseError(s.to_string())),
        }
    }
}

// =============================================================================
// Market Context
// =============================================================================

/// One side of a book or quote: a price with the size resting there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price of the level.
    pub price: Decimal,
    /// Size available at the level.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a price level.
    #[must_use]
    pub const fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// The strategy's two-sided quote valid at a point in time.
///
/// Either side may be absent when the strategy is only quoting one way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Bid the strategy is showing.
    pub bid: Option<PriceLevel>,
    /// Ask the strategy is showing.
    pub ask: Option<PriceLevel>,
    /// When the quote was generated.
    pub time: DateTime<Utc>,
}

/// Top of the locally maintained order book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTopSnapshot {
    /// Best bid, absent when the bid side is empty.
    pub best_bid: Option<PriceLevel>,
    /// Best ask, absent when the ask side is empty.
    pub best_ask: Option<PriceLevel>,
}

// =============================================================================
// Trades
// =============================================================================

/// A trade print as reported by the exchange gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTradeEvent {
    /// Trade price.
    pub price: Decimal,
    /// Trade size.
    pub size: Decimal,
    /// Exchange timestamp of the print.
    pub time: DateTime<Utc>,
    /// Set for historical prints the gateway replays when it connects.
    #[serde(default)]
    pub is_startup_replay: bool,
}

impl RawTradeEvent {
    /// Create a live trade event.
    #[must_use]
    pub const fn live(price: Decimal, size: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            price,
            size,
            time,
            is_startup_replay: false,
        }
    }

    /// Create a startup replay event.
    #[must_use]
    pub const fn replay(price: Decimal, size: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            price,
            size,
            time,
            is_startup_replay: true,
        }
    }
}

/// Quote and book state read when a raw trade arrived from the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketContext {
    /// Strategy quote at arrival.
    pub quote: Option<QuoteSnapshot>,
    /// Book top at arrival.
    pub book: Option<BookTopSnapshot>,
}

/// A raw trade together with the context sampled at its arrival.
///
/// Events may wait in a queue before the broker handles them; the context
/// travels with the event so a later book never leaks into an earlier trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeArrival {
    /// The gateway's event.
    pub raw: RawTradeEvent,
    /// State sampled when the event arrived. Empty for replay events.
    pub context: MarketContext,
}

impl TradeArrival {
    /// Pair an event with its sampled context.
    #[must_use]
    pub const fn new(raw: RawTradeEvent, context: MarketContext) -> Self {
        Self { raw, context }
    }

    /// An arrival with no context.
    #[must_use]
    pub const fn without_context(raw: RawTradeEvent) -> Self {
        Self::new(
            raw,
            MarketContext {
                quote: None,
                book: None,
            },
        )
    }
}

/// A trade paired with the quote and book state current when it printed.
///
/// This is the unit of distribution and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedTrade {
    /// Trade price.
    pub price: Decimal,
    /// Trade size.
    pub size: Decimal,
    /// Exchange timestamp of the print.
    pub time: DateTime<Utc>,
    /// Strategy quote at the time of the trade.
    pub quote: Option<QuoteSnapshot>,
    /// Best bid of the local book at the time of the trade.
    pub book_bid: Option<PriceLevel>,
    /// Best ask of the local book at the time of the trade.
    pub book_ask: Option<PriceLevel>,
}

impl EnrichedTrade {
    /// Build a trade record with no quote or book context.
    #[must_use]
    pub const fn without_context(raw: &RawTradeEvent) -> Self {
        Self {
            price: raw.price,
            size: raw.size,
            time: raw.time,
            quote: None,
            book_bid: None,
            book_ask: None,
        }
    }

    /// Whether the record carries any quote or book context.
    #[must_use]
    pub const fn has_context(&self) -> bool {
        self.quote.is_some() || self.book_bid.is_some() || self.book_ask.is_some()
    }
}

/// Wraps a payload with the exchange and pair it belongs to, so one store
/// can multiplex many markets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeScopedEnvelope<T> {
    /// Exchange the payload belongs to.
    pub exchange: Exchange,
    /// Pair the payload belongs to.
    pub pair: CurrencyPair,
    /// The scoped payload.
    pub payload: T,
}

impl<T> ExchangeScopedEnvelope<T> {
    /// Wrap a payload.
    #[must_use]
    pub const fn new(exchange: Exchange, pair: CurrencyPair, payload: T) -> Self {
        Self {
            exchange,
            pair,
            payload,
        }
    }
}

/// Payloads whose timestamp is stored in a separate, codec-controlled column.
pub trait Timestamped {
    /// The payload's domain timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Replace the payload's timestamp with one restored from storage.
    fn set_timestamp(&mut self, time: DateTime<Utc>);
}

impl Timestamped for EnrichedTrade {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }

    fn set_timestamp(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }
}

// =============================================================================
// Tests
// =============================================================================
