//! Persistence Adapter
//!
//! Writes exchange-scoped payloads to a [`DocumentStore`] without blocking
//! the caller, and loads bounded recent history back at startup.
//!
//! # Time codecs
//!
//! Different payload kinds were stored with different time encodings over
//! the life of the store. A [`TimeCodec`] is a pair of pure functions moving
//! a payload's timestamp between the domain type and the raw stored column,
//! so one persister implementation serves every collection.
//!
//! # Failure handling
//!
//! `persist` spawns a detached task on the current tokio runtime. A failed
//! write is logged and counted; it is never surfaced to the caller and
//! never retried here. Only a missing runtime is reported synchronously.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;

use crate::application::ports::{DocumentStore, StoreError, StoredDocument};
use crate::domain::trade::{CurrencyPair, Exchange, ExchangeScopedEnvelope, Timestamped};
use crate::infrastructure::metrics;

/// Collection market trades are stored in.
pub const MARKET_TRADES_COLLECTION: &str = "mt";

// =============================================================================
// Time Codecs
// =============================================================================

/// Errors decoding a stored time column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeCodecError {
    /// The stored value had the wrong JSON type.
    #[error("expected {expected} time value, got {found}")]
    UnexpectedType {
        /// Encoding the codec expects.
        expected: &'static str,
        /// The value that was found.
        found: String,
    },

    /// The stored value does not map to a representable instant.
    #[error("time value out of range: {0}")]
    OutOfRange(String),

    /// The stored string could not be parsed.
    #[error("invalid time value: {0}")]
    Invalid(String),
}

/// Converts a payload timestamp to and from its stored representation.
#[derive(Clone, Copy)]
pub struct TimeCodec {
    /// Raw stored value to domain time.
    pub decode: fn(&Value) -> Result<DateTime<Utc>, TimeCodecError>,
    /// Domain time to raw stored value.
    pub encode: fn(DateTime<Utc>) -> Value,
}

impl TimeCodec {
    /// Integer milliseconds since the Unix epoch.
    pub const EPOCH_MILLIS: Self = Self {
        decode: decode_epoch_millis,
        encode: encode_epoch_millis,
    };

    /// RFC 3339 string with nanosecond precision.
    pub const RFC3339: Self = Self {
        decode: decode_rfc3339,
        encode: encode_rfc3339,
    };
}

impl fmt::Debug for TimeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeCodec").finish_non_exhaustive()
    }
}

fn decode_epoch_millis(value: &Value) -> Result<DateTime<Utc>, TimeCodecError> {
    let millis = value.as_i64().ok_or_else(|| TimeCodecError::UnexpectedType {
        expected: "integer milliseconds",
        found: value.to_string(),
    })?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| TimeCodecError::OutOfRange(millis.to_string()))
}

fn encode_epoch_millis(time: DateTime<Utc>) -> Value {
    Value::from(time.timestamp_millis())
}

fn decode_rfc3339(value: &Value) -> Result<DateTime<Utc>, TimeCodecError> {
    let text = value.as_str().ok_or_else(|| TimeCodecError::UnexpectedType {
        expected: "RFC 3339 string",
        found: value.to_string(),
    })?;
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TimeCodecError::Invalid(format!("{text}: {e}")))
}

fn encode_rfc3339(time: DateTime<Utc>) -> Value {
    Value::String(time.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

// =============================================================================
// Errors
// =============================================================================

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored document could not be turned back into a payload.
    #[error("failed to decode document: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The stored time column could not be decoded.
    #[error(transparent)]
    Time(#[from] TimeCodecError),

    /// No tokio runtime to run the write on.
    #[error("no runtime for background write: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

// =============================================================================
// Persister
// =============================================================================

/// Persists exchange-scoped payloads of type `T` to one collection.
pub struct Persister<T> {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    codec: TimeCodec,
    _payload: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Persister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("collection", &self.collection)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl<T> Persister<T>
where
    T: Timestamped + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a persister for a collection.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, codec: TimeCodec) -> Self {
        Self {
            store,
            collection: Arc::from(collection),
            codec,
            _payload: PhantomData,
        }
    }

    /// Collection this persister writes to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Schedule a durable write and return immediately.
    ///
    /// The returned handle may be dropped; the write continues detached.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NoRuntime`] when called outside a tokio
    /// runtime. Nothing is written in that case.
    pub fn persist(
        &self,
        envelope: ExchangeScopedEnvelope<T>,
    ) -> Result<JoinHandle<()>, PersistenceError> {
        let runtime = Handle::try_current().inspect_err(|_| {
            metrics::record_persist_failure(&self.collection);
        })?;
        let store = Arc::clone(&self.store);
        let collection = Arc::clone(&self.collection);
        let codec = self.codec;

        Ok(runtime.spawn(async move {
            let started = Instant::now();
            let result = match encode_document(codec, &envelope) {
                Ok(document) => store
                    .insert(&collection, document)
                    .await
                    .map_err(PersistenceError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    metrics::record_persist_duration(&collection, started.elapsed());
                }
                Err(e) => {
                    metrics::record_persist_failure(&collection);
                    tracing::error!(
                        collection = %collection,
                        exchange = %envelope.exchange,
                        pair = %envelope.pair,
                        error = %e,
                        "Failed to persist document"
                    );
                }
            }
        }))
    }

    /// Load up to `limit` most recently persisted payloads, oldest first.
    ///
    /// Documents that cannot be decoded are skipped. The result is ordered
    /// by payload timestamp; ties keep storage order.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Store`] if the store query fails.
    pub async fn load(
        &self,
        exchange: &Exchange,
        pair: &CurrencyPair,
        limit: usize,
    ) -> Result<Vec<ExchangeScopedEnvelope<T>>, PersistenceError> {
        let documents = self
            .store
            .find_recent(
                &self.collection,
                exchange.as_str(),
                &pair.to_string(),
                limit,
            )
            .await?;

        let mut loaded = Vec::with_capacity(documents.len());
        for document in documents.into_iter().take(limit).rev() {
            match self.decode(document) {
                Ok(envelope) => loaded.push(envelope),
                Err(e) => {
                    tracing::warn!(
                        collection = %self.collection,
                        error = %e,
                        "Skipping undecodable stored document"
                    );
                }
            }
        }
        // Detached writes may land slightly out of order.
        loaded.sort_by_key(|envelope| envelope.payload.timestamp());

        Ok(loaded)
    }

    /// Encode an envelope into a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Encode`] if the payload cannot be serialized.
    pub fn encode(
        &self,
        envelope: &ExchangeScopedEnvelope<T>,
    ) -> Result<StoredDocument, PersistenceError> {
        encode_document(self.codec, envelope)
    }

    /// Decode a stored document into an envelope.
    ///
    /// The payload's timestamp is restored from the time column.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the pair, payload or time is invalid.
    pub fn decode(
        &self,
        document: StoredDocument,
    ) -> Result<ExchangeScopedEnvelope<T>, PersistenceError> {
        let pair: CurrencyPair =
            document
                .pair
                .parse()
                .map_err(|e: crate::domain::trade::PairParseError| PersistenceError::Decode {
                    message: e.to_string(),
                })?;

        let mut payload: T =
            serde_json::from_value(document.data).map_err(|e| PersistenceError::Decode {
                message: e.to_string(),
            })?;
        payload.set_timestamp((self.codec.decode)(&document.time)?);

        Ok(ExchangeScopedEnvelope::new(
            Exchange::new(&document.exchange),
            pair,
            payload,
        ))
    }
}

fn encode_document<T>(
    codec: TimeCodec,
    envelope: &ExchangeScopedEnvelope<T>,
) -> Result<StoredDocument, PersistenceError>
where
    T: Timestamped + Serialize,
{
    Ok(StoredDocument {
        exchange: envelope.exchange.as_str().to_string(),
        pair: envelope.pair.to_string(),
        time: (codec.encode)(envelope.payload.timestamp()),
        data: serde_json::to_value(&envelope.payload).map_err(PersistenceError::Encode)?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::domain::trade::{EnrichedTrade, PriceLevel, RawTradeEvent};
    use crate::infrastructure::store::InMemoryDocumentStore;

    fn trade(seconds: i64) -> EnrichedTrade {
        let time = Utc.timestamp_opt(1_709_294_400 + seconds, 0).unwrap();
        let mut trade = EnrichedTrade::without_context(&RawTradeEvent::live(
            Decimal::new(100 + seconds, 0),
            Decimal::ONE,
            time,
        ));
        trade.book_bid = Some(PriceLevel::new(Decimal::new(995, 1), Decimal::ONE));
        trade
    }

    fn envelope(seconds: i64) -> ExchangeScopedEnvelope<EnrichedTrade> {
        ExchangeScopedEnvelope::new(
            Exchange::new("coinbase"),
            CurrencyPair::new("BTC", "USD"),
            trade(seconds),
        )
    }

    fn persister(store: Arc<dyn DocumentStore>) -> Persister<EnrichedTrade> {
        Persister::new(store, MARKET_TRADES_COLLECTION, TimeCodec::EPOCH_MILLIS)
    }

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn insert(&self, _: &str, _: StoredDocument) -> Result<(), StoreError> {
            Err(StoreError::Unavailable {
                message: "disk full".to_string(),
            })
        }

        async fn find_recent(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: usize,
        ) -> Result<Vec<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable {
                message: "offline".to_string(),
            })
        }
    }

    #[test]
    fn epoch_millis_codec() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let raw = (TimeCodec::EPOCH_MILLIS.encode)(time);
        assert_eq!(raw, json!(1_709_294_400_000_i64));
        assert_eq!((TimeCodec::EPOCH_MILLIS.decode)(&raw).unwrap(), time);

        assert!(matches!(
            (TimeCodec::EPOCH_MILLIS.decode)(&json!("2024-03-01T12:00:00Z")),
            Err(TimeCodecError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn rfc3339_codec() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let raw = (TimeCodec::RFC3339.encode)(time);
        assert_eq!(raw, json!("2024-03-01T12:00:00.000000000Z"));
        assert_eq!((TimeCodec::RFC3339.decode)(&raw).unwrap(), time);

        assert!(matches!(
            (TimeCodec::RFC3339.decode)(&json!("yesterday")),
            Err(TimeCodecError::Invalid(_))
        ));
        assert!(matches!(
            (TimeCodec::RFC3339.decode)(&json!(5)),
            Err(TimeCodecError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn encode_uses_codec_for_time_column() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let document = persister(store).encode(&envelope(0)).unwrap();

        assert_eq!(document.exchange, "coinbase");
        assert_eq!(document.pair, "BTC/USD");
        assert_eq!(document.time, json!(1_709_294_400_000_i64));
        assert_eq!(document.data["price"], json!("100"));
    }

    #[test]
    fn decode_restores_time_from_column() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store);
        let mut document = persister.encode(&envelope(0)).unwrap();
        document.time = json!(1_709_294_460_000_i64);

        let decoded = persister.decode(document).unwrap();
        assert_eq!(decoded.payload.time, trade(60).time);
        assert_eq!(decoded.payload.price, Decimal::new(100, 0));
    }

    #[test]
    fn decode_rejects_bad_pair() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store);
        let mut document = persister.encode(&envelope(0)).unwrap();
        document.pair = "BTCUSD".to_string();

        assert!(matches!(
            persister.decode(document),
            Err(PersistenceError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn persist_then_load_oldest_first() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store.clone());

        for n in 0..5 {
            persister.persist(envelope(n)).unwrap().await.unwrap();
        }

        let loaded = persister
            .load(&Exchange::new("coinbase"), &CurrencyPair::new("BTC", "USD"), 3)
            .await
            .unwrap();

        let times: Vec<_> = loaded.iter().map(|e| e.payload.time).collect();
        assert_eq!(times, vec![trade(2).time, trade(3).time, trade(4).time]);
        assert_eq!(loaded[2].payload, trade(4));
    }

    #[tokio::test]
    async fn load_is_scoped_to_exchange_and_pair() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store.clone());

        persister.persist(envelope(0)).unwrap().await.unwrap();
        persister
            .persist(ExchangeScopedEnvelope::new(
                Exchange::new("kraken"),
                CurrencyPair::new("BTC", "USD"),
                trade(1),
            ))
            .unwrap()
            .await
            .unwrap();

        let loaded = persister
            .load(&Exchange::new("kraken"), &CurrencyPair::new("BTC", "USD"), 100)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].exchange, Exchange::new("kraken"));
    }

    #[tokio::test]
    async fn load_from_empty_store_is_empty() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let loaded = persister(store)
            .load(&Exchange::new("coinbase"), &CurrencyPair::new("BTC", "USD"), 100)
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn load_skips_undecodable_documents() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store.clone());
        persister.persist(envelope(0)).unwrap().await.unwrap();
        store
            .insert(
                MARKET_TRADES_COLLECTION,
                StoredDocument {
                    exchange: "coinbase".to_string(),
                    pair: "BTC/USD".to_string(),
                    time: json!("not millis"),
                    data: json!({}),
                },
            )
            .await
            .unwrap();

        let loaded = persister
            .load(&Exchange::new("coinbase"), &CurrencyPair::new("BTC", "USD"), 100)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn persist_failure_is_swallowed() {
        let persister = persister(Arc::new(FailingStore));

        let handle = persister.persist(envelope(0)).unwrap();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok(), "write task should finish");
        assert!(joined.unwrap().is_ok(), "write task should not panic");
    }

    #[test]
    fn persist_outside_runtime_is_reported() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let persister = persister(store.clone());

        assert!(matches!(
            persister.persist(envelope(0)),
            Err(PersistenceError::NoRuntime(_))
        ));
        assert_eq!(store.len(MARKET_TRADES_COLLECTION), 0);
    }

    #[tokio::test]
    async fn load_failure_is_reported() {
        let result = persister(Arc::new(FailingStore))
            .load(&Exchange::new("coinbase"), &CurrencyPair::new("BTC", "USD"), 100)
            .await;
        assert!(matches!(result, Err(PersistenceError::Store(_))));
    }
}
