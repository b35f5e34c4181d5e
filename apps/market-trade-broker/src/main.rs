//! Market Trade Broker Binary
//!
//! Connects to the exchange feed, seeds the trade log from the journal and
//! serves enriched trades.
//!
//! # Usage
//!
//! ```bash
//! MARKET_FEED_URL=wss://feed.example/ws cargo run --bin market-trade-broker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_FEED_URL`: exchange feed WebSocket URL
//!
//! ## Optional
//! - `MARKET_EXCHANGE`: exchange name (default: coinbase)
//! - `MARKET_PAIR`: traded pair (default: BTC/USD)
//! - `MARKET_TRADES_SNAPSHOT_SIZE`: trades sent to new subscribers (default: 50)
//! - `MARKET_TRADES_HISTORY_LIMIT`: trades replayed from the journal (default: 100)
//! - `MARKET_TRADES_HISTORY_TIMEOUT_SECS`: bound on the journal load (default: 10)
//! - `MARKET_TRADES_LOG_RETENTION`: trades kept in memory (default: 10000)
//! - `MARKET_TRADES_BROADCAST_CAPACITY`: per-subscriber buffer (default: 10000)
//! - `MARKET_TRADES_STORE_DIR`: journal directory (default: ./data)
//! - `MARKET_TRADES_STREAM_PORT`: `/trades` WebSocket port (default: 8090)
//! - `MARKET_TRADES_HEALTH_PORT`: health check HTTP port (default: 8082)
//! - `MARKET_FEED_RECONNECT_DELAY_INITIAL_MS`, `MARKET_FEED_RECONNECT_DELAY_MAX_SECS`,
//!   `MARKET_FEED_RECONNECT_DELAY_MULTIPLIER`, `MARKET_FEED_MAX_RECONNECT_ATTEMPTS`
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`, `RUST_LOG`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_trade_broker::application::services::MARKET_TRADES_COLLECTION;
use market_trade_broker::infrastructure::feed::{
    ChannelTradeFeed, DEFAULT_FEED_CAPACITY, FeedClient, FeedClientConfig, FeedState,
};
use market_trade_broker::infrastructure::market_state::{LatestBook, LatestQuote};
use market_trade_broker::infrastructure::store::JournalDocumentStore;
use market_trade_broker::infrastructure::telemetry;
use market_trade_broker::{
    BrokerConfig, HealthServer, HealthServerState, MarketTradeBroker, Persister,
    StreamServerState, TimeCodec, TradeBroadcastHub, TradeStreamServer, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Bound on waiting for the broker task after shutdown is signalled.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting Market Trade Broker");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = BrokerConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Durable history
    let store = JournalDocumentStore::open(&config.storage.dir)
        .await
        .with_context(|| format!("failed to open journal at {}", config.storage.dir.display()))?;
    let persister = Arc::new(Persister::new(
        Arc::new(store),
        MARKET_TRADES_COLLECTION,
        TimeCodec::EPOCH_MILLIS,
    ));

    // Quote and book state. The quote cell belongs to an in-process strategy;
    // the book cell is kept current by the feed client.
    let quotes = Arc::new(LatestQuote::new());
    let book = Arc::new(LatestBook::new());

    let broadcast_hub = Arc::new(TradeBroadcastHub::new(config.broadcast));

    let broker = Arc::new(MarketTradeBroker::new(
        config.broker,
        config.market.scope(),
        quotes,
        Arc::clone(&book) as _,
        Arc::clone(&broadcast_hub) as _,
        persister,
    ));

    // The broker subscribes before the feed client starts, so live trades
    // queue behind the history load. Each is stamped with the book and quote
    // as it enters the queue.
    let feed = ChannelTradeFeed::new(DEFAULT_FEED_CAPACITY, broker.sampler());
    let broker_task = broker.start(&feed, shutdown_token.clone())?;

    let feed_state = Arc::new(FeedState::new());
    let feed_client = Arc::new(FeedClient::new(
        FeedClientConfig {
            url: config.market.feed_url.clone(),
            pair: config.market.pair.clone(),
            reconnect: config.reconnect,
        },
        feed.sender(),
        book,
        Arc::clone(&feed_state),
        shutdown_token.clone(),
    ));
    drop(feed);

    let stream_state = Arc::new(StreamServerState::new(
        Arc::clone(&broadcast_hub),
        shutdown_token.clone(),
    ));
    let stream_server = TradeStreamServer::new(config.server.stream_port, Arc::clone(&stream_state));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        feed_state,
        Arc::clone(&broker),
        broadcast_hub,
        stream_state,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn feed client
    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Feed client stopped");
        }
    });

    // Spawn stream server
    tokio::spawn(async move {
        if let Err(e) = stream_server.run().await {
            tracing::error!(error = %e, "Trade stream server error");
        }
    });

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Market trade broker ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, broker_task).await {
        Ok(Ok(outcome)) => tracing::debug!(?outcome, "Broker task finished"),
        Ok(Err(e)) => tracing::error!(error = %e, "Broker task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Broker task did not stop in time"
        ),
    }

    let stats = broker.stats();
    tracing::info!(
        live_trades = stats.live_trades,
        seeded = stats.seeded,
        dropped = stats.dropped,
        "Market trade broker stopped"
    );
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &BrokerConfig) {
    tracing::info!(
        exchange = %config.market.exchange,
        pair = %config.market.pair,
        snapshot_size = config.broker.snapshot_size,
        history_limit = config.broker.history_limit,
        retention = config.broker.retention,
        stream_port = config.server.stream_port,
        health_port = config.server.health_port,
        store_dir = %config.storage.dir.display(),
        "Configuration loaded"
    );
    tracing::debug!(feed_url = %config.market.feed_url, "Feed endpoint");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel everything.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
