//! Trade Observer Port
//!
//! In-process listeners notified of every live trade appended to the log,
//! in registration order. A failing observer is isolated: it never stops
//! delivery to the observers after it, the broadcast, or persistence.

use crate::domain::trade::EnrichedTrade;

/// Error returned by an observer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("trade observer failed: {message}")]
pub struct ObserverError {
    /// Failure details.
    pub message: String,
}

impl ObserverError {
    /// Create an observer error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Listener for live enriched trades.
pub trait TradeObserver: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Handle a newly appended trade.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError`] if the observer could not handle the trade.
    fn on_trade(&self, trade: &EnrichedTrade) -> Result<(), ObserverError>;
}
