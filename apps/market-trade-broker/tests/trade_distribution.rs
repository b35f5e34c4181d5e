//! Trade Distribution Integration Tests
//!
//! Runs the broker against the journal store and the broadcast hub: live
//! trades reach subscribers and the journal, and a restarted broker seeds
//! its log from that journal before accepting live trades.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use market_trade_broker::application::ports::DocumentStore;
use market_trade_broker::application::services::MARKET_TRADES_COLLECTION;
use market_trade_broker::infrastructure::feed::ChannelTradeFeed;
use market_trade_broker::infrastructure::market_state::{LatestBook, LatestQuote};
use market_trade_broker::infrastructure::store::JournalDocumentStore;
use market_trade_broker::{
    BookTopSnapshot, BrokerSettings, CurrencyPair, Exchange, MarketScope, MarketTradeBroker,
    Persister, PriceLevel, QuoteSnapshot, RawTradeEvent, ReplayOutcome, TimeCodec,
    TradeBroadcastHub,
};

struct Node {
    broker: Arc<MarketTradeBroker>,
    hub: Arc<TradeBroadcastHub>,
    quotes: Arc<LatestQuote>,
    book: Arc<LatestBook>,
    store: Arc<JournalDocumentStore>,
}

async fn node(dir: &Path, settings: BrokerSettings) -> Node {
    let store = Arc::new(JournalDocumentStore::open(dir).await.unwrap());
    let persister = Arc::new(Persister::new(
        Arc::clone(&store) as _,
        MARKET_TRADES_COLLECTION,
        TimeCodec::EPOCH_MILLIS,
    ));
    let hub = Arc::new(TradeBroadcastHub::with_defaults());
    let quotes = Arc::new(LatestQuote::new());
    let book = Arc::new(LatestBook::new());
    let broker = Arc::new(MarketTradeBroker::new(
        settings,
        MarketScope::new(Exchange::new("coinbase"), CurrencyPair::new("BTC", "USD")),
        Arc::clone(&quotes) as _,
        Arc::clone(&book) as _,
        Arc::clone(&hub) as _,
        persister,
    ));
    Node {
        broker,
        hub,
        quotes,
        book,
        store,
    }
}

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_709_294_400_000 + millis).unwrap()
}

fn level(price: i64, size: i64) -> PriceLevel {
    PriceLevel::new(Decimal::from(price), Decimal::from(size))
}

async fn journal_len(store: &JournalDocumentStore) -> usize {
    store
        .find_recent(MARKET_TRADES_COLLECTION, "coinbase", "BTC/USD", usize::MAX)
        .await
        .unwrap()
        .len()
}

async fn wait_for_journal(store: &JournalDocumentStore, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while journal_len(store).await < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("trades persisted");
}

async fn wait_until_live(broker: &MarketTradeBroker) {
    timeout(Duration::from_secs(2), async {
        while !broker.is_live() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("broker went live");
}

#[tokio::test]
async fn live_trades_reach_subscribers_and_journal() {
    let dir = tempfile::tempdir().unwrap();
    let n = node(dir.path(), BrokerSettings::default()).await;

    n.book.update(BookTopSnapshot {
        best_bid: Some(level(99, 3)),
        best_ask: Some(level(101, 4)),
    });
    n.quotes.update(QuoteSnapshot {
        bid: Some(level(98, 1)),
        ask: None,
        time: at(0),
    });

    let mut subscription = n.hub.subscribe();
    assert!(subscription.snapshot.is_empty());

    let feed = ChannelTradeFeed::new(16, n.broker.sampler());
    let cancel = CancellationToken::new();
    let task = n.broker.start(&feed, cancel.clone()).unwrap();

    feed.push(RawTradeEvent::live(Decimal::from(100), Decimal::from(2), at(1)))
        .await
        .unwrap();

    let trade = timeout(Duration::from_secs(1), subscription.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trade.price, Decimal::from(100));
    assert_eq!(trade.book_bid, Some(level(99, 3)));
    assert_eq!(trade.book_ask, Some(level(101, 4)));
    assert_eq!(trade.quote.and_then(|q| q.bid), Some(level(98, 1)));

    wait_for_journal(&n.store, 1).await;
    let stored = n
        .store
        .find_recent(MARKET_TRADES_COLLECTION, "coinbase", "BTC/USD", 1)
        .await
        .unwrap();
    assert_eq!(stored[0].time, serde_json::json!(at(1).timestamp_millis()));

    cancel.cancel();
    assert_eq!(task.await.unwrap(), ReplayOutcome::Seeded(0));
}

#[tokio::test]
async fn trade_queued_before_start_keeps_its_book() {
    let dir = tempfile::tempdir().unwrap();
    let n = node(dir.path(), BrokerSettings::default()).await;
    let feed = ChannelTradeFeed::new(16, n.broker.sampler());

    n.book.update(BookTopSnapshot {
        best_bid: Some(level(99, 1)),
        best_ask: Some(level(101, 1)),
    });
    feed.push(RawTradeEvent::live(Decimal::from(100), Decimal::ONE, at(1)))
        .await
        .unwrap();
    n.book.update(BookTopSnapshot {
        best_bid: Some(level(200, 1)),
        best_ask: Some(level(201, 1)),
    });

    let mut subscription = n.hub.subscribe();
    let cancel = CancellationToken::new();
    let _task = n.broker.start(&feed, cancel.clone()).unwrap();

    let trade = timeout(Duration::from_secs(1), subscription.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trade.book_bid, Some(level(99, 1)));
    assert_eq!(trade.book_ask, Some(level(101, 1)));

    cancel.cancel();
}

#[tokio::test]
async fn startup_replay_events_are_logged_but_not_distributed() {
    let dir = tempfile::tempdir().unwrap();
    let n = node(dir.path(), BrokerSettings::default()).await;
    n.book.update(BookTopSnapshot {
        best_bid: Some(level(99, 1)),
        best_ask: Some(level(101, 1)),
    });

    let mut subscription = n.hub.subscribe();
    let feed = ChannelTradeFeed::new(16, n.broker.sampler());
    let cancel = CancellationToken::new();
    let _task = n.broker.start(&feed, cancel.clone()).unwrap();

    feed.push(RawTradeEvent::replay(Decimal::from(1), Decimal::ONE, at(1)))
        .await
        .unwrap();
    feed.push(RawTradeEvent::replay(Decimal::from(2), Decimal::ONE, at(2)))
        .await
        .unwrap();
    feed.push(RawTradeEvent::live(Decimal::from(3), Decimal::ONE, at(3)))
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(1), subscription.receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.price, Decimal::from(3));

    let snapshot = n.broker.snapshot();
    let prices: Vec<_> = snapshot.iter().map(|t| t.price).collect();
    assert_eq!(
        prices,
        vec![Decimal::from(1), Decimal::from(2), Decimal::from(3)]
    );
    assert!(!snapshot[0].has_context());
    assert!(snapshot[2].has_context());

    wait_for_journal(&n.store, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(journal_len(&n.store).await, 1);

    cancel.cancel();
}

#[tokio::test]
async fn restart_seeds_log_from_journal() {
    let dir = tempfile::tempdir().unwrap();

    {
        let n = node(dir.path(), BrokerSettings::default()).await;
        n.book.update(BookTopSnapshot {
            best_bid: Some(level(99, 1)),
            best_ask: Some(level(101, 1)),
        });
        let feed = ChannelTradeFeed::new(256, n.broker.sampler());
        let cancel = CancellationToken::new();
        let task = n.broker.start(&feed, cancel.clone()).unwrap();
        for i in 0..120 {
            feed.push(RawTradeEvent::live(Decimal::from(i), Decimal::ONE, at(i)))
                .await
                .unwrap();
        }
        wait_for_journal(&n.store, 120).await;
        cancel.cancel();
        task.await.unwrap();
    }

    let n = node(dir.path(), BrokerSettings::default()).await;
    let mut early = n.hub.subscribe();
    assert!(early.snapshot.is_empty());

    let feed = ChannelTradeFeed::new(16, n.broker.sampler());
    let cancel = CancellationToken::new();
    let task = n.broker.start(&feed, cancel.clone()).unwrap();
    wait_until_live(&n.broker).await;

    let stats = n.broker.stats();
    assert_eq!(stats.seeded, 100);
    assert_eq!(stats.log_len, 100);

    // Seeded history is not re-broadcast.
    assert!(early.receiver.try_recv().is_err());

    let late = n.hub.subscribe();
    assert_eq!(late.snapshot.len(), 50);
    assert_eq!(late.snapshot[0].price, Decimal::from(70));
    assert_eq!(late.snapshot[49].price, Decimal::from(119));
    assert_eq!(late.snapshot[49].time, at(119));
    assert_eq!(late.snapshot[49].book_bid, Some(level(99, 1)));

    // Nothing was written back during seeding.
    assert_eq!(journal_len(&n.store).await, 120);

    cancel.cancel();
    assert_eq!(task.await.unwrap(), ReplayOutcome::Seeded(100));
}

#[tokio::test]
async fn history_is_scoped_to_exchange_and_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store = JournalDocumentStore::open(dir.path()).await.unwrap();
    let other = Persister::new(
        Arc::new(store) as _,
        MARKET_TRADES_COLLECTION,
        TimeCodec::EPOCH_MILLIS,
    );
    let trade = market_trade_broker::EnrichedTrade::without_context(&RawTradeEvent::live(
        Decimal::from(7),
        Decimal::ONE,
        at(0),
    ));
    other
        .persist(market_trade_broker::ExchangeScopedEnvelope::new(
            Exchange::new("kraken"),
            CurrencyPair::new("BTC", "USD"),
            trade,
        ))
        .unwrap()
        .await
        .unwrap();

    let n = node(dir.path(), BrokerSettings::default()).await;
    let feed = ChannelTradeFeed::new(4, n.broker.sampler());
    let cancel = CancellationToken::new();
    let task = n.broker.start(&feed, cancel.clone()).unwrap();
    wait_until_live(&n.broker).await;

    assert!(n.broker.snapshot().is_empty());
    cancel.cancel();
    assert_eq!(task.await.unwrap(), ReplayOutcome::Seeded(0));
}
