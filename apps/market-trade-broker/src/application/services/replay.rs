//! Startup Replay
//!
//! Seeds the broker's trade log from recently persisted trades so a
//! restarted process can serve late-joining subscribers a snapshot straight
//! away. Seeded trades are history: they are not re-enriched, re-persisted
//! or broadcast.
//!
//! The load is bounded in size and time. A failed or slow store never
//! blocks startup; the broker proceeds with an empty log.

use std::sync::Arc;
use std::time::Duration;

use crate::application::services::market_trades::MarketTradeBroker;
use crate::application::services::persister::Persister;
use crate::domain::trade::EnrichedTrade;

/// Default number of persisted trades loaded at startup.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default bound on the startup history load.
pub const DEFAULT_HISTORY_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a startup replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// This many trades were seeded into the log.
    Seeded(usize),
    /// The store query failed.
    Failed,
    /// The store did not answer in time.
    TimedOut,
    /// Shutdown was requested before the load finished.
    Cancelled,
}

impl ReplayOutcome {
    /// Number of trades seeded.
    #[must_use]
    pub const fn seeded(self) -> usize {
        match self {
            Self::Seeded(n) => n,
            Self::Failed | Self::TimedOut | Self::Cancelled => 0,
        }
    }
}

/// Loads persisted history into a broker's log.
#[derive(Debug)]
pub struct StartupReplay {
    persister: Arc<Persister<EnrichedTrade>>,
    history_limit: usize,
    load_timeout: Duration,
}

impl StartupReplay {
    /// Create a replay controller.
    #[must_use]
    pub const fn new(
        persister: Arc<Persister<EnrichedTrade>>,
        history_limit: usize,
        load_timeout: Duration,
    ) -> Self {
        Self {
            persister,
            history_limit,
            load_timeout,
        }
    }

    /// Seed `broker` with up to `history_limit` trades for its market,
    /// oldest first.
    pub async fn seed(&self, broker: &MarketTradeBroker) -> ReplayOutcome {
        if self.history_limit == 0 {
            return ReplayOutcome::Seeded(0);
        }

        let load = self
            .persister
            .load(broker.exchange(), broker.pair(), self.history_limit);

        match tokio::time::timeout(self.load_timeout, load).await {
            Ok(Ok(history)) => {
                let seeded = broker.seed(history.into_iter().map(|envelope| envelope.payload));
                tracing::info!(
                    exchange = %broker.exchange(),
                    pair = %broker.pair(),
                    seeded,
                    "Seeded trade log from history"
                );
                ReplayOutcome::Seeded(seeded)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    exchange = %broker.exchange(),
                    pair = %broker.pair(),
                    error = %e,
                    "Failed to load trade history, starting with an empty log"
                );
                ReplayOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    exchange = %broker.exchange(),
                    pair = %broker.pair(),
                    timeout_ms = u64::try_from(self.load_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Trade history load timed out, starting with an empty log"
                );
                ReplayOutcome::TimedOut
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
