//! Exchange Feed WebSocket Client
//!
//! Maintains one connection to the exchange's market data feed for a single
//! pair. Top of book updates replace the shared book cell; trade prints are
//! pushed into the broker's trade feed, which stamps each with the book
//! current at that moment.
//!
//! # Protocol
//!
//! After connecting, the client sends a subscribe request for the pair.
//! Frames are JSON objects or arrays of objects (see `messages`).
//!
//! # Reconnection
//!
//! Any connection failure triggers exponential backoff with jitter. The
//! book cell is cleared on disconnect: a book from a dead connection is
//! stale, and live trades arriving before a fresh book are dropped. Trades
//! already queued keep the book they arrived with.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::channel::TradeSender;
use super::codec::{CodecError, FeedCodec};
use super::messages::{FeedMessage, SubscriptionRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::domain::trade::CurrencyPair;
use crate::infrastructure::market_state::LatestBook;
use crate::infrastructure::metrics::{self, FeedMessageKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The trade channel's receiver is gone.
    #[error("trade channel closed")]
    ChannelSend,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Pair to subscribe to.
    pub pair: CurrencyPair,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default reconnection settings.
    #[must_use]
    pub fn new(url: impl Into<String>, pair: CurrencyPair) -> Self {
        Self {
            url: url.into(),
            pair,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// WebSocket client for the exchange market data feed.
pub struct FeedClient {
    config: FeedClientConfig,
    pair_symbol: String,
    codec: FeedCodec,
    trades: TradeSender,
    book: Arc<LatestBook>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.config.url)
            .field("pair", &self.pair_symbol)
            .field("state", &self.state.state())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        trades: TradeSender,
        book: Arc<LatestBook>,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pair_symbol: config.pair.to_string(),
            config,
            codec: FeedCodec::new(),
            trades,
            book,
            state,
            cancel,
        }
    }

    /// Connection state shared with the health server.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when reconnection attempts are exhausted or the
    /// trade channel closes.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.state.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            let result = self.connect_and_run(&mut reconnect_policy).await;
            self.book.clear();

            match result {
                Ok(()) => {
                    tracing::info!("Feed connection closed gracefully");
                    self.state.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(FeedClientError::ChannelSend) => {
                    self.state.set_error("trade channel closed");
                    return Err(FeedClientError::ChannelSend);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    self.state.record_error(e.to_string());

                    let Some(delay) = reconnect_policy.next_delay() else {
                        self.state.set_error("maximum reconnection attempts exceeded");
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    self.state.set_state(ConnectionState::Reconnecting);
                    self.state.increment_reconnect_attempts();
                    tracing::info!(
                        attempt = reconnect_policy.attempt_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to exchange feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            self.state.set_state(ConnectionState::Disconnected);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, subscribe, and process frames until error or cancellation.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.url, pair = %self.pair_symbol, "Connecting to exchange feed");
        self.state.set_state(ConnectionState::Connecting);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let request = self
            .codec
            .encode(&SubscriptionRequest::for_pair(&self.pair_symbol))?;
        write.send(Message::Text(request.into())).await?;

        self.state.set_state(ConnectionState::Connected);
        reconnect_policy.reset();
        tracing::info!(pair = %self.pair_symbol, "Exchange feed connected");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and route its messages.
    ///
    /// Undecodable frames are logged and skipped; only a closed trade
    /// channel is an error.
    async fn handle_text_message(&self, text: &str) -> Result<(), FeedClientError> {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable feed frame");
                return Ok(());
            }
        };

        for message in messages {
            self.state.increment_messages();

            match message {
                FeedMessage::Trade(trade) => {
                    metrics::record_feed_message(FeedMessageKind::Trade);
                    if trade.pair != self.pair_symbol {
                        tracing::debug!(pair = %trade.pair, "Ignoring trade for other pair");
                        continue;
                    }
                    self.trades
                        .send(trade.to_raw())
                        .await
                        .map_err(|_| FeedClientError::ChannelSend)?;
                }
                FeedMessage::BookTop(book) => {
                    metrics::record_feed_message(FeedMessageKind::Book);
                    if book.pair != self.pair_symbol {
                        continue;
                    }
                    self.book.update(book.to_snapshot());
                }
                FeedMessage::Success(success) => {
                    metrics::record_feed_message(FeedMessageKind::Control);
                    tracing::debug!(msg = %success.msg, "Feed success message");
                }
                FeedMessage::Subscription(subscription) => {
                    metrics::record_feed_message(FeedMessageKind::Control);
                    tracing::info!(
                        trades = ?subscription.trades,
                        books = ?subscription.books,
                        "Feed subscription confirmed"
                    );
                }
                FeedMessage::Error(error) => {
                    metrics::record_feed_message(FeedMessageKind::Control);
                    tracing::error!(code = error.code, msg = %error.msg, "Feed error message");
                    self.state.record_error(format!("{}: {}", error.code, error.msg));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
