#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Trade Broker - Trade Enrichment and Distribution
//!
//! Receives trade prints for one exchange pair, stamps each live print with
//! the strategy's current quote and the local book top, keeps a bounded
//! in-memory log, and fans every live trade out to in-process observers,
//! WebSocket subscribers and a durable journal. At startup the log is seeded
//! from the most recent persisted trades before live trades are accepted.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: trade types, enrichment, bounded trade log
//! - **Application**: ports and services
//!   - `ports`: feed, providers, publisher, observers, document store
//!   - `services`: context sampler, broker, persister, startup replay
//! - **Infrastructure**: adapters and servers
//!   - `feed`: exchange WebSocket client and in-process trade feed
//!   - `market_state`: latest quote and book cells
//!   - `broadcast`: snapshot-on-subscribe broadcast hub
//!   - `websocket`: `/trades` stream server
//!   - `store`: in-memory and journal document stores
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                    quote cell   book cell <-- book updates --+
//!                         |           |                        |
//!                         +-----+-----+ (sampled on arrival)   |
//!                               v                              |
//! Exchange WS --> FeedClient --> trade feed --> MarketTradeBroker --+--> observers
//!                 (trades)                      (enrich, log)       +--> broadcast hub --> /trades clients
//!                                                    ^              +--> persister --> journal
//!                                                    |                                    |
//!                                                    +------- startup replay <------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trade types and pure logic.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::trade::{
    BookTopSnapshot, CurrencyPair, EnrichedTrade, Exchange, ExchangeScopedEnvelope, MarketContext,
    PriceLevel, QuoteSnapshot, RawTradeEvent, TradeArrival,
};

// Services
pub use application::services::{
    BrokerSettings, BrokerStats, ContextSampler, MarketScope, MarketTradeBroker, Persister,
    ReplayOutcome, TimeCodec,
};

// Infrastructure config
pub use infrastructure::config::{BrokerConfig, ConfigError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Broadcast hub
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastStats, SharedTradeBroadcastHub, TradeBroadcastHub,
};

// Stream server
pub use infrastructure::websocket::{StreamMessage, StreamServerState, TradeStreamServer};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
