//! In-Memory Trade Log
//!
//! Ordered, append-only log of enriched trades held for snapshotting.
//! Insertion order is arrival order. Retention is bounded: once the log is
//! full the oldest trade is evicted on every append.

use std::collections::VecDeque;

use crate::domain::trade::EnrichedTrade;

/// Default number of trades kept in memory.
pub const DEFAULT_RETENTION: usize = 10_000;

/// Bounded, arrival-ordered trade log.
#[derive(Debug, Clone)]
pub struct TradeLog {
    trades: VecDeque<EnrichedTrade>,
    retention: usize,
    total_appended: u64,
}

impl Default for TradeLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl TradeLog {
    /// Create a log keeping at most `retention` trades (minimum 1).
    #[must_use]
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            trades: VecDeque::with_capacity(retention.min(DEFAULT_RETENTION)),
            retention,
            total_appended: 0,
        }
    }

    /// Append a trade to the end of the log, evicting the oldest if full.
    pub fn append(&mut self, trade: EnrichedTrade) {
        if self.trades.len() >= self.retention {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
        self.total_appended += 1;
    }

    /// The most recent `count` trades, oldest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<EnrichedTrade> {
        let skip = self.trades.len().saturating_sub(count);
        self.trades.iter().skip(skip).cloned().collect()
    }

    /// The most recently appended trade.
    #[must_use]
    pub fn last(&self) -> Option<&EnrichedTrade> {
        self.trades.back()
    }

    /// Iterate over retained trades, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EnrichedTrade> {
        self.trades.iter()
    }

    /// Number of retained trades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Whether the log holds no trades.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Maximum number of retained trades.
    #[must_use]
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Trades appended over the log's lifetime, including evicted ones.
    #[must_use]
    pub const fn total_appended(&self) -> u64 {
        self.total_appended
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::trade::RawTradeEvent;

    fn trade(n: i64) -> EnrichedTrade {
        let time = Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap();
        EnrichedTrade::without_context(&RawTradeEvent::live(
            Decimal::new(n, 0),
            Decimal::ONE,
            time,
        ))
    }

    #[test]
    fn new_log_is_empty() {
        let log = TradeLog::new(10);
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(log.recent(50).is_empty());
        assert!(log.last().is_none());
    }

    #[test]
    fn append_preserves_arrival_order() {
        let mut log = TradeLog::new(10);
        for n in 0..3 {
            log.append(trade(n));
        }

        let prices: Vec<_> = log.iter().map(|t| t.price).collect();
        assert_eq!(
            prices,
            vec![Decimal::new(0, 0), Decimal::new(1, 0), Decimal::new(2, 0)]
        );
        assert_eq!(log.last(), Some(&trade(2)));
    }

    #[test]
    fn retention_evicts_oldest() {
        let mut log = TradeLog::new(3);
        for n in 0..5 {
            log.append(trade(n));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.total_appended(), 5);
        assert_eq!(log.recent(10), vec![trade(2), trade(3), trade(4)]);
    }

    #[test]
    fn zero_retention_is_clamped() {
        let mut log = TradeLog::new(0);
        log.append(trade(1));
        assert_eq!(log.retention(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn recent_zero_is_empty() {
        let mut log = TradeLog::new(5);
        log.append(trade(1));
        assert!(log.recent(0).is_empty());
    }

    proptest! {
        #[test]
        fn recent_returns_min_of_len_and_count(appends in 0usize..200) {
            let mut log = TradeLog::new(DEFAULT_RETENTION);
            for n in 0..appends {
                log.append(trade(i64::try_from(n).unwrap()));
            }

            let snapshot = log.recent(50);
            prop_assert_eq!(snapshot.len(), appends.min(50));

            let first = appends.saturating_sub(50);
            for (offset, t) in snapshot.iter().enumerate() {
                let expected = i64::try_from(first + offset).unwrap();
                prop_assert_eq!(t.price, Decimal::new(expected, 0));
            }
        }
    }
}
