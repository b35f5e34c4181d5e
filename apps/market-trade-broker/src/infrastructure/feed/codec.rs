//! Feed Codec
//!
//! Decodes exchange feed text frames. A frame is either a single JSON
//! object or an array of them.

use super::messages::FeedMessage;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message carried an unknown `T` discriminator.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Frame is not a JSON object or array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

const KNOWN_TYPES: [&str; 5] = ["success", "error", "subscription", "t", "b"];

/// JSON codec for the exchange feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into feed messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON, or any message in it
    /// has an unknown type or invalid fields.
    pub fn decode(&self, text: &str) -> Result<Vec<FeedMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
            values.into_iter().map(decode_value).collect()
        } else if trimmed.starts_with('{') {
            Ok(vec![decode_value(serde_json::from_str(trimmed)?)?])
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )))
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn decode_value(value: serde_json::Value) -> Result<FeedMessage, CodecError> {
    let msg_type = value.get("T").and_then(serde_json::Value::as_str);
    match msg_type {
        Some(known) if KNOWN_TYPES.contains(&known) => Ok(serde_json::from_value(value)?),
        Some(other) => Err(CodecError::UnknownMessageType(other.to_string())),
        None => Err(CodecError::InvalidFormat(
            "message has no type discriminator".to_string(),
        )),
    }
}
