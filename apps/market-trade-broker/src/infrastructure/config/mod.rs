//! Configuration Module
//!
//! Environment-driven configuration for the broker service.

mod settings;

pub use settings::{
    BrokerConfig, ConfigError, DEFAULT_EXCHANGE, MarketSettings, ServerSettings, StorageSettings,
};
