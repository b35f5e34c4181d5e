//! Market Trade Broker
//!
//! Owns the in-memory trade log for one exchange and pair and distributes
//! every live enriched trade to in-process observers, the fan-out transport
//! and durable storage.
//!
//! # Ordering
//!
//! For each live trade, in this order:
//!
//! 1. append to the log (write lock held only for the push)
//! 2. notify observers in registration order
//! 3. publish on the transport
//! 4. hand the envelope to the persister (detached, never awaited)
//!
//! # Lifecycle
//!
//! [`MarketTradeBroker::start`] subscribes to the feed before spawning the
//! broker task. That task seeds the log from persisted history and only
//! then drains live events, so seeded history always precedes live trades
//! in the log. Events that arrive while seeding wait in the feed channel,
//! each carrying the quote and book sampled when it arrived.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BookProvider, FeedError, QuoteProvider, TradeFeed, TradeObserver, TradePublisher,
};
use crate::application::services::context::ContextSampler;
use crate::application::services::persister::Persister;
use crate::application::services::replay::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_LOAD_TIMEOUT, ReplayOutcome, StartupReplay,
};
use crate::domain::enrichment::enrich;
use crate::domain::trade::{
    CurrencyPair, EnrichedTrade, Exchange, ExchangeScopedEnvelope, RawTradeEvent, TradeArrival,
};
use crate::domain::trade_log::{DEFAULT_RETENTION, TradeLog};
use crate::infrastructure::metrics::{self, TradeOrigin};

/// Default number of trades in a new subscriber's snapshot.
pub const DEFAULT_SNAPSHOT_SIZE: usize = 50;

// =============================================================================
// Settings
// =============================================================================

/// Broker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Trades handed to a new subscriber.
    pub snapshot_size: usize,
    /// Persisted trades loaded at startup.
    pub history_limit: usize,
    /// Bound on the startup history load.
    pub history_load_timeout: Duration,
    /// Trades kept in memory. Never less than `snapshot_size`.
    pub retention: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            snapshot_size: DEFAULT_SNAPSHOT_SIZE,
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_load_timeout: DEFAULT_HISTORY_LOAD_TIMEOUT,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// The market a broker serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketScope {
    /// Exchange name.
    pub exchange: Exchange,
    /// Traded pair.
    pub pair: CurrencyPair,
}

impl MarketScope {
    /// Create a market scope.
    #[must_use]
    pub const fn new(exchange: Exchange, pair: CurrencyPair) -> Self {
        Self { exchange, pair }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time broker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Live trades appended.
    pub live_trades: u64,
    /// Gateway replay trades appended.
    pub replay_trades: u64,
    /// Trades seeded from persisted history.
    pub seeded: u64,
    /// Raw events dropped before reaching the log.
    pub dropped: u64,
    /// Observer callbacks that failed or panicked.
    pub observer_failures: u64,
    /// Subscriber deliveries queued on the transport.
    pub broadcast_deliveries: u64,
    /// Trades currently in the log.
    pub log_len: usize,
}

#[derive(Debug, Default)]
struct Counters {
    live_trades: AtomicU64,
    replay_trades: AtomicU64,
    seeded: AtomicU64,
    dropped: AtomicU64,
    observer_failures: AtomicU64,
    broadcast_deliveries: AtomicU64,
}

// =============================================================================
// Broker
// =============================================================================

/// Enriches, records and distributes trades for one market.
pub struct MarketTradeBroker {
    scope: MarketScope,
    settings: BrokerSettings,
    sampler: ContextSampler,
    publisher: Arc<dyn TradePublisher>,
    persister: Arc<Persister<EnrichedTrade>>,
    log: Arc<RwLock<TradeLog>>,
    observers: RwLock<Vec<Arc<dyn TradeObserver>>>,
    live: AtomicBool,
    counters: Counters,
}

impl std::fmt::Debug for MarketTradeBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketTradeBroker")
            .field("scope", &self.scope)
            .field("settings", &self.settings)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

impl MarketTradeBroker {
    /// Create a broker and register its snapshot provider on `publisher`.
    #[must_use]
    pub fn new(
        settings: BrokerSettings,
        scope: MarketScope,
        quotes: Arc<dyn QuoteProvider>,
        book: Arc<dyn BookProvider>,
        publisher: Arc<dyn TradePublisher>,
        persister: Arc<Persister<EnrichedTrade>>,
    ) -> Self {
        let settings = BrokerSettings {
            retention: settings.retention.max(settings.snapshot_size),
            ..settings
        };
        let log = Arc::new(RwLock::new(TradeLog::new(settings.retention)));

        let snapshot_log = Arc::clone(&log);
        let snapshot_size = settings.snapshot_size;
        publisher.register_snapshot_provider(Arc::new(move || {
            snapshot_log.read().recent(snapshot_size)
        }));

        Self {
            scope,
            settings,
            sampler: ContextSampler::new(quotes, book),
            publisher,
            persister,
            log,
            observers: RwLock::new(Vec::new()),
            live: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Exchange this broker serves.
    #[must_use]
    pub const fn exchange(&self) -> &Exchange {
        &self.scope.exchange
    }

    /// Pair this broker serves.
    #[must_use]
    pub const fn pair(&self) -> &CurrencyPair {
        &self.scope.pair
    }

    /// Effective settings, after clamping.
    #[must_use]
    pub const fn settings(&self) -> BrokerSettings {
        self.settings
    }

    /// Register an observer for live trades.
    pub fn on_trade(&self, observer: Arc<dyn TradeObserver>) {
        tracing::debug!(observer = observer.name(), "Registered trade observer");
        self.observers.write().push(observer);
    }

    /// Sampler reading this broker's quote and book providers.
    ///
    /// Hand it to whatever queues raw events for the broker so context is
    /// read at arrival.
    #[must_use]
    pub fn sampler(&self) -> ContextSampler {
        self.sampler.clone()
    }

    /// Process one raw event arriving now.
    pub fn handle_raw_trade(&self, raw: RawTradeEvent) {
        self.handle_arrival(self.sampler.sample(raw));
    }

    /// Process one event with the context sampled at its arrival.
    ///
    /// Replay events go into the log only. Live events that arrived without
    /// a book are dropped with a warning.
    pub fn handle_arrival(&self, arrival: TradeArrival) {
        let TradeArrival { raw, context } = arrival;
        metrics::record_trade_received(if raw.is_startup_replay {
            TradeOrigin::Replay
        } else {
            TradeOrigin::Live
        });

        let trade = match enrich(&raw, context.quote, context.book) {
            Ok(trade) => trade,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_trade_dropped("book_unavailable");
                tracing::warn!(
                    exchange = %self.scope.exchange,
                    pair = %self.scope.pair,
                    price = %raw.price,
                    size = %raw.size,
                    error = %e,
                    "Dropping trade"
                );
                return;
            }
        };

        if raw.is_startup_replay {
            self.push(trade);
            self.counters.replay_trades.fetch_add(1, Ordering::Relaxed);
        } else {
            self.append(trade);
        }
    }

    /// Append a live trade and distribute it.
    ///
    /// Persistence runs on the current tokio runtime. Outside one, the trade
    /// is still logged and distributed and the skipped write is logged.
    pub fn append(&self, trade: EnrichedTrade) {
        self.push(trade.clone());
        self.counters.live_trades.fetch_add(1, Ordering::Relaxed);

        self.notify_observers(&trade);

        let delivered = self.publisher.publish(&trade);
        self.counters
            .broadcast_deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        metrics::record_broadcast(delivered);

        // Detached; the write outlives this call.
        if let Err(e) = self.persister.persist(ExchangeScopedEnvelope::new(
            self.scope.exchange.clone(),
            self.scope.pair.clone(),
            trade,
        )) {
            tracing::error!(
                exchange = %self.scope.exchange,
                pair = %self.scope.pair,
                error = %e,
                "Trade not persisted"
            );
        }
    }

    /// Put historical trades into the log without distributing them.
    ///
    /// Returns the number of trades seeded.
    pub fn seed(&self, trades: impl IntoIterator<Item = EnrichedTrade>) -> usize {
        let (seeded, len) = {
            let mut log = self.log.write();
            let mut seeded = 0;
            for trade in trades {
                log.append(trade);
                seeded += 1;
            }
            (seeded, log.len())
        };

        self.counters
            .seeded
            .fetch_add(seeded as u64, Ordering::Relaxed);
        metrics::record_history_seeded(seeded);
        metrics::set_trade_log_size(len);
        seeded
    }

    /// Up to `count` most recent trades, oldest first.
    #[must_use]
    pub fn recent_trades(&self, count: usize) -> Vec<EnrichedTrade> {
        self.log.read().recent(count)
    }

    /// The snapshot a new subscriber receives.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EnrichedTrade> {
        self.recent_trades(self.settings.snapshot_size)
    }

    /// Whether startup seeding has finished and live events are flowing.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            live_trades: self.counters.live_trades.load(Ordering::Relaxed),
            replay_trades: self.counters.replay_trades.load(Ordering::Relaxed),
            seeded: self.counters.seeded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            observer_failures: self.counters.observer_failures.load(Ordering::Relaxed),
            broadcast_deliveries: self.counters.broadcast_deliveries.load(Ordering::Relaxed),
            log_len: self.log.read().len(),
        }
    }

    /// Subscribe to `feed` and spawn the broker task.
    ///
    /// The task seeds the log from history, then drains live events until
    /// the feed closes or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the feed refuses the subscription.
    pub fn start(
        self: &Arc<Self>,
        feed: &dyn TradeFeed,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<ReplayOutcome>, FeedError> {
        let mut events = feed.subscribe()?;
        let broker = Arc::clone(self);
        let replay = StartupReplay::new(
            Arc::clone(&self.persister),
            self.settings.history_limit,
            self.settings.history_load_timeout,
        );

        Ok(tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = replay.seed(&broker) => outcome,
                () = cancel.cancelled() => {
                    tracing::info!("Shutdown requested during history load");
                    return ReplayOutcome::Cancelled;
                }
            };

            broker.live.store(true, Ordering::Release);
            tracing::info!(
                exchange = %broker.scope.exchange,
                pair = %broker.scope.pair,
                seeded = outcome.seeded(),
                "Trade broker live"
            );

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::info!("Trade broker shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(arrival) => broker.handle_arrival(arrival),
                        None => {
                            tracing::warn!("Trade feed closed");
                            break;
                        }
                    }
                }
            }

            broker.live.store(false, Ordering::Release);
            outcome
        }))
    }

    fn push(&self, trade: EnrichedTrade) {
        let len = {
            let mut log = self.log.write();
            log.append(trade);
            log.len()
        };
        metrics::set_trade_log_size(len);
    }

    fn notify_observers(&self, trade: &EnrichedTrade) {
        // Cloned so an observer may register another without deadlocking.
        let observers = self.observers.read().clone();

        for observer in &observers {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| observer.on_trade(trade))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "observer panicked".to_string(),
            };

            self.counters
                .observer_failures
                .fetch_add(1, Ordering::Relaxed);
            metrics::record_observer_failure(observer.name());
            tracing::error!(
                observer = observer.name(),
                error = %failure,
                "Trade observer failed"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
