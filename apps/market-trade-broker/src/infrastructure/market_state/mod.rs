//! Market State Cells
//!
//! Latest-value holders written by the components that own the state (the
//! strategy for quotes, the feed client for the book) and read on the trade
//! path through the provider ports.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::{BookProvider, QuoteProvider};
use crate::domain::trade::{BookTopSnapshot, QuoteSnapshot};

/// A cell holding the most recent value written to it.
#[derive(Debug)]
pub struct LatestValue<T> {
    value: RwLock<Option<T>>,
}

impl<T> Default for LatestValue<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<T: Copy> LatestValue<T> {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    pub fn update(&self, value: T) {
        *self.value.write() = Some(value);
    }

    /// Forget the current value.
    pub fn clear(&self) {
        *self.value.write() = None;
    }

    /// The current value, if any.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        *self.value.read()
    }
}

/// The strategy's latest quote.
pub type LatestQuote = LatestValue<QuoteSnapshot>;

/// The local order book's current top.
pub type LatestBook = LatestValue<BookTopSnapshot>;

/// Shared quote cell.
pub type SharedLatestQuote = Arc<LatestQuote>;

/// Shared book cell.
pub type SharedLatestBook = Arc<LatestBook>;

impl QuoteProvider for LatestValue<QuoteSnapshot> {
    fn latest_quote(&self) -> Option<QuoteSnapshot> {
        self.get()
    }
}

impl BookProvider for LatestValue<BookTopSnapshot> {
    fn current_book(&self) -> Option<BookTopSnapshot> {
        self.get()
    }
}
