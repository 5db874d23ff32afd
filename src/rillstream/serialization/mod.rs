//! Pluggable codecs for record keys and values.
//!
//! A [`Codec`] converts between [`StreamValue`] and the byte representation
//! used on the wire. Codecs are attached to topics and state stores via
//! [`TopicConfig`](crate::rillstream::topic::TopicConfig) and
//! [`StateStoreConfig`](crate::rillstream::state::StateStoreConfig); the
//! topology core never touches bytes itself, it only hands codec references
//! to the runtime alongside the compiled graph.

mod json_codec;
mod string_codec;

pub use json_codec::JsonCodec;
pub use string_codec::{BytesCodec, StringCodec};

use crate::rillstream::types::StreamValue;
use std::sync::Arc;

/// Errors produced while serializing or deserializing record data.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// JSON encoding or decoding failed
    #[error("JSON serialization failed: {message}")]
    JsonError {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The value's variant cannot be represented by this codec
    #[error("Codec '{codec}' cannot represent value: {reason}")]
    UnsupportedValue { codec: String, reason: String },

    /// The input bytes are not valid for this codec
    #[error("Codec '{codec}' failed to decode input: {reason}")]
    InvalidData { codec: String, reason: String },
}

impl SerializationError {
    /// JSON error with an underlying serde_json cause.
    pub fn json_error(message: impl Into<String>, source: serde_json::Error) -> Self {
        SerializationError::JsonError {
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Converts between `StreamValue` and bytes.
///
/// Implementations must be stateless: the same codec instance is shared by
/// every node that references it.
pub trait Codec: Send + Sync {
    /// Serialize a value to bytes.
    fn serialize(&self, value: &StreamValue) -> Result<Vec<u8>, SerializationError>;

    /// Deserialize bytes to a value.
    fn deserialize(&self, bytes: &[u8]) -> Result<StreamValue, SerializationError>;

    /// Short codec name used in error messages and topology descriptions.
    fn name(&self) -> &'static str;
}

/// Shared handle to a codec, as stored on topic and store configurations.
pub type CodecRef = Arc<dyn Codec>;
