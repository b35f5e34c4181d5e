//! Market State Ports (Driven Ports)
//!
//! Synchronous reads of state owned by other components: the strategy's
//! latest quote and the order book's current top. Reads must be cheap, they
//! happen on the trade path.

use crate::domain::trade::{BookTopSnapshot, QuoteSnapshot};

/// Source of the strategy's latest quote.
#[cfg_attr(test, mockall::automock)]
pub trait QuoteProvider: Send + Sync {
    /// The most recent quote, or `None` if the strategy has not quoted.
    fn latest_quote(&self) -> Option<QuoteSnapshot>;
}

/// Source of the current top of book.
#[cfg_attr(test, mockall::automock)]
pub trait BookProvider: Send + Sync {
    /// The current top of book, or `None` if no book is available.
    fn current_book(&self) -> Option<BookTopSnapshot>;
}
