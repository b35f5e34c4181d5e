//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ContextSampler`: reads quote and book state when a trade arrives
//! - `MarketTradeBroker`: enriches, logs and distributes trades
//! - `Persister`: fire-and-forget durable writes with time codecs
//! - `StartupReplay`: seeds the trade log from persisted history

pub mod context;
pub mod market_trades;
pub mod persister;
pub mod replay;

pub use context::ContextSampler;
pub use market_trades::{
    BrokerSettings, BrokerStats, DEFAULT_SNAPSHOT_SIZE, MarketScope, MarketTradeBroker,
};
pub use persister::{
    MARKET_TRADES_COLLECTION, PersistenceError, Persister, TimeCodec, TimeCodecError,
};
pub use replay::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_LOAD_TIMEOUT, ReplayOutcome, StartupReplay,
};
