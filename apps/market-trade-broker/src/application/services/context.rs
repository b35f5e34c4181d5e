//! Arrival-time context sampling.
//!
//! A live trade is enriched with the quote and book that were current when
//! the gateway delivered it. The sampler runs on the delivering side, before
//! the event is queued for the broker, and the result travels with the
//! event.

use std::sync::Arc;

use crate::application::ports::{BookProvider, QuoteProvider};
use crate::domain::trade::{MarketContext, RawTradeEvent, TradeArrival};

/// Reads the quote and book providers for arriving trades.
#[derive(Clone)]
pub struct ContextSampler {
    quotes: Arc<dyn QuoteProvider>,
    book: Arc<dyn BookProvider>,
}

impl std::fmt::Debug for ContextSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSampler").finish_non_exhaustive()
    }
}

impl ContextSampler {
    /// Create a sampler over the given providers.
    #[must_use]
    pub const fn new(quotes: Arc<dyn QuoteProvider>, book: Arc<dyn BookProvider>) -> Self {
        Self { quotes, book }
    }

    /// Stamp `raw` with the current quote and book.
    ///
    /// Replay events are history and never read live state.
    #[must_use]
    pub fn sample(&self, raw: RawTradeEvent) -> TradeArrival {
        if raw.is_startup_replay {
            return TradeArrival::without_context(raw);
        }

        TradeArrival::new(
            raw,
            MarketContext {
                quote: self.quotes.latest_quote(),
                book: self.book.current_book(),
            },
        )
    }
}
