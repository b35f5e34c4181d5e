//! Domain Layer - Core trade types and business logic.
//!
//! This layer contains the trade model, the enrichment rules and the
//! in-memory trade log. Nothing here performs I/O.

/// Trade, quote and book types.
pub mod trade;

/// Raw trade to enriched trade transformation.
pub mod enrichment;

/// Bounded, arrival-ordered trade log.
pub mod trade_log;
