//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (feed, stores, transport).
pub mod ports;

/// Application services: trade broker, persister, startup replay.
pub mod services;
