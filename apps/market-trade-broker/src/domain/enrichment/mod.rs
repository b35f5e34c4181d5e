//! Trade Enrichment
//!
//! Pairs a raw trade print with the quote and book state that were current
//! when it was processed.
//!
//! Startup replay prints are historical: live quote and book state says
//! nothing about the market they printed into, so they are never enriched.
//! Live prints always need a resolvable book; a missing book is a
//! precondition failure and no record is produced.

use crate::domain::trade::{BookTopSnapshot, EnrichedTrade, QuoteSnapshot, RawTradeEvent};

/// Enrichment errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    /// A live trade arrived while no order book was available.
    #[error("order book unavailable for live trade at {time}")]
    BookUnavailable {
        /// Timestamp of the rejected trade.
        time: chrono::DateTime<chrono::Utc>,
    },
}

/// Enrich a raw trade with quote and book context.
///
/// `quote` may legitimately be `None` (the strategy has not quoted yet).
/// `book` must be present for live trades. Both are ignored for startup
/// replay prints.
///
/// # Errors
///
/// Returns [`EnrichmentError::BookUnavailable`] for a live trade with no book.
pub fn enrich(
    raw: &RawTradeEvent,
    quote: Option<QuoteSnapshot>,
    book: Option<BookTopSnapshot>,
) -> Result<EnrichedTrade, EnrichmentError> {
    if raw.is_startup_replay {
        return Ok(EnrichedTrade::without_context(raw));
    }

    let book = book.ok_or(EnrichmentError::BookUnavailable { time: raw.time })?;

    Ok(EnrichedTrade {
        price: raw.price,
        size: raw.size,
        time: raw.time,
        quote,
        book_bid: book.best_bid,
        book_ask: book.best_ask,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;
    use crate::domain::trade::PriceLevel;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn level(price: &str) -> PriceLevel {
        PriceLevel::new(d(price), d("1"))
    }

    fn book(bid: &str, ask: &str) -> BookTopSnapshot {
        BookTopSnapshot {
            best_bid: Some(level(bid)),
            best_ask: Some(level(ask)),
        }
    }

    fn quote(bid: &str, ask: &str) -> QuoteSnapshot {
        QuoteSnapshot {
            bid: Some(level(bid)),
            ask: Some(level(ask)),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 11, 59, 59).unwrap(),
        }
    }

    fn raw(replay: bool) -> RawTradeEvent {
        RawTradeEvent {
            price: d("100"),
            size: d("2"),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            is_startup_replay: replay,
        }
    }

    #[test]
    fn live_trade_takes_quote_and_book() {
        let trade = enrich(
            &raw(false),
            Some(quote("99.4", "100.6")),
            Some(book("99.5", "100.5")),
        )
        .unwrap();

        assert_eq!(trade.price, d("100"));
        assert_eq!(trade.size, d("2"));
        assert_eq!(trade.time, raw(false).time);
        assert_eq!(trade.quote, Some(quote("99.4", "100.6")));
        assert_eq!(trade.book_bid, Some(level("99.5")));
        assert_eq!(trade.book_ask, Some(level("100.5")));
    }

    #[test]
    fn live_trade_without_quote_is_allowed() {
        let trade = enrich(&raw(false), None, Some(book("99.5", "100.5"))).unwrap();
        assert!(trade.quote.is_none());
        assert!(trade.book_bid.is_some());
    }

    #[test]
    fn live_trade_with_one_sided_book_keeps_missing_side_empty() {
        let one_sided = BookTopSnapshot {
            best_bid: Some(level("99.5")),
            best_ask: None,
        };
        let trade = enrich(&raw(false), None, Some(one_sided)).unwrap();
        assert_eq!(trade.book_bid, Some(level("99.5")));
        assert!(trade.book_ask.is_none());
    }

    #[test]
    fn live_trade_without_book_fails() {
        let err = enrich(&raw(false), Some(quote("1", "2")), None).unwrap_err();
        assert_eq!(err, EnrichmentError::BookUnavailable { time: raw(false).time });
    }

    #[test_case(None, None ; "no live state")]
    #[test_case(Some(quote("99.4", "100.6")), None ; "quote only")]
    #[test_case(None, Some(book("99.5", "100.5")) ; "book only")]
    #[test_case(Some(quote("99.4", "100.6")), Some(book("99.5", "100.5")) ; "quote and book")]
    fn replay_trade_never_carries_context(
        quote: Option<QuoteSnapshot>,
        book: Option<BookTopSnapshot>,
    ) {
        let trade = enrich(&raw(true), quote, book).unwrap();
        assert!(!trade.has_context());
        assert_eq!(trade.price, d("100"));
        assert_eq!(trade.size, d("2"));
    }

    #[test]
    fn enrichment_is_deterministic() {
        let q = Some(quote("99.4", "100.6"));
        let b = Some(book("99.5", "100.5"));
        assert_eq!(enrich(&raw(false), q, b), enrich(&raw(false), q, b));
    }
}
