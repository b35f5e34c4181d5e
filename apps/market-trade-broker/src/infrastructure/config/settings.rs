//! Broker Configuration Settings
//!
//! Configuration types for the market trade broker, loaded from environment
//! variables. Every variable except `MARKET_FEED_URL` has a default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{
    BrokerSettings, DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_LOAD_TIMEOUT, DEFAULT_SNAPSHOT_SIZE,
    MarketScope,
};
use crate::domain::trade::{CurrencyPair, Exchange};
use crate::domain::trade_log::DEFAULT_RETENTION;
use crate::infrastructure::broadcast::{BroadcastConfig, DEFAULT_BROADCAST_CAPACITY};
use crate::infrastructure::feed::ReconnectConfig;

/// Default exchange name.
pub const DEFAULT_EXCHANGE: &str = "coinbase";

/// Market and upstream feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSettings {
    /// Exchange the trades come from.
    pub exchange: Exchange,
    /// Traded pair.
    pub pair: CurrencyPair,
    /// Exchange feed WebSocket URL.
    pub feed_url: String,
}

impl MarketSettings {
    /// The broker scope for this market.
    #[must_use]
    pub fn scope(&self) -> MarketScope {
        MarketScope::new(self.exchange.clone(), self.pair.clone())
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Trade stream WebSocket port.
    pub stream_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            stream_port: 8090,
            health_port: 8082,
        }
    }
}

/// Trade journal location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Directory holding one journal file per collection.
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
        }
    }
}

/// Complete broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Market and feed.
    pub market: MarketSettings,
    /// Trade log, snapshot and replay settings.
    pub broker: BrokerSettings,
    /// Stream subscriber buffering.
    pub broadcast: BroadcastConfig,
    /// Feed reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Server ports.
    pub server: ServerSettings,
    /// Journal storage.
    pub storage: StorageSettings,
}

impl BrokerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_FEED_URL` is missing or any variable
    /// holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_FEED_URL` is missing or any variable
    /// holds a value that does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let feed_url = env
            .get("MARKET_FEED_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("MARKET_FEED_URL".to_string()))?;
        let exchange = env
            .get("MARKET_EXCHANGE")
            .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());

        let market = MarketSettings {
            exchange: Exchange::new(exchange),
            pair: env.parse("MARKET_PAIR", CurrencyPair::new("BTC", "USD"))?,
            feed_url,
        };

        let snapshot_size = env.parse("MARKET_TRADES_SNAPSHOT_SIZE", DEFAULT_SNAPSHOT_SIZE)?;
        let broker = BrokerSettings {
            snapshot_size,
            history_limit: env.parse("MARKET_TRADES_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            history_load_timeout: env.secs(
                "MARKET_TRADES_HISTORY_TIMEOUT_SECS",
                DEFAULT_HISTORY_LOAD_TIMEOUT,
            )?,
            retention: env
                .parse("MARKET_TRADES_LOG_RETENTION", DEFAULT_RETENTION)?
                .max(snapshot_size),
        };

        let broadcast = BroadcastConfig {
            capacity: env.parse("MARKET_TRADES_BROADCAST_CAPACITY", DEFAULT_BROADCAST_CAPACITY)?,
        };
        if broadcast.capacity == 0 {
            return Err(ConfigError::invalid("MARKET_TRADES_BROADCAST_CAPACITY", "0"));
        }

        let defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay: env.millis(
                "MARKET_FEED_RECONNECT_DELAY_INITIAL_MS",
                defaults.initial_delay,
            )?,
            max_delay: env.secs("MARKET_FEED_RECONNECT_DELAY_MAX_SECS", defaults.max_delay)?,
            multiplier: env.parse("MARKET_FEED_RECONNECT_DELAY_MULTIPLIER", defaults.multiplier)?,
            max_attempts: env.parse("MARKET_FEED_MAX_RECONNECT_ATTEMPTS", defaults.max_attempts)?,
            ..defaults
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            stream_port: env.parse("MARKET_TRADES_STREAM_PORT", server_defaults.stream_port)?,
            health_port: env.parse("MARKET_TRADES_HEALTH_PORT", server_defaults.health_port)?,
        };

        let storage = StorageSettings {
            dir: env
                .get("MARKET_TRADES_STORE_DIR")
                .map_or_else(|| StorageSettings::default().dir, PathBuf::from),
        };

        Ok(Self {
            market,
            broker,
            broadcast,
            reconnect,
            server,
            storage,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable does not parse.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Variable source with typed accessors. Blank values count as unset.
struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, &raw))
        })
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::invalid(key, &raw))
        })
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::invalid(key, &raw))
        })
    }
}
