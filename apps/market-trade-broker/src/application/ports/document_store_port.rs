//! Document Store Port (Driven Port)
//!
//! Generic durable storage shared by every persisted payload kind. Documents
//! are grouped in named collections and scoped by exchange and pair, so one
//! store multiplexes many markets.
//!
//! The store owns the record layout. The payload and its time column arrive
//! already encoded; see `application::services::persister` for the codecs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Exchange the document belongs to.
    pub exchange: String,
    /// Pair the document belongs to, as `BASE/QUOTE`.
    pub pair: String,
    /// Raw time column, in whatever encoding the collection's codec uses.
    pub time: serde_json::Value,
    /// Serialized payload.
    pub data: serde_json::Value,
}

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The collection name cannot be used by this store.
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    /// The store is not reachable.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

/// Port for durable document storage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durably write a document to a collection.
    async fn insert(&self, collection: &str, document: StoredDocument) -> Result<(), StoreError>;

    /// Load up to `limit` documents for an exchange and pair, newest first.
    async fn find_recent(
        &self,
        collection: &str,
        exchange: &str,
        pair: &str,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}
