//! Document Store Adapters
//!
//! - `JournalDocumentStore`: durable, append-only JSON-lines files
//! - `InMemoryDocumentStore`: volatile, for tests and headless runs

mod journal;
mod memory;

pub use journal::JournalDocumentStore;
pub use memory::InMemoryDocumentStore;
