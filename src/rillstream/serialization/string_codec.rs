//! UTF-8 string and raw-bytes codecs.

use super::{Codec, SerializationError};
use crate::rillstream::types::StreamValue;

/// Codec for UTF-8 string keys and values.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn serialize(&self, value: &StreamValue) -> Result<Vec<u8>, SerializationError> {
        match value {
            StreamValue::String(s) => Ok(s.as_bytes().to_vec()),
            StreamValue::Null => Ok(Vec::new()),
            other => Err(SerializationError::UnsupportedValue {
                codec: "string".to_string(),
                reason: format!("expected a string value, got {}", other),
            }),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StreamValue, SerializationError> {
        let s = std::str::from_utf8(bytes).map_err(|e| SerializationError::InvalidData {
            codec: "string".to_string(),
            reason: e.to_string(),
        })?;
        Ok(StreamValue::String(s.to_string()))
    }

    fn name(&self) -> &'static str {
        "string"
    }
}

/// Pass-through codec for opaque byte payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    fn serialize(&self, value: &StreamValue) -> Result<Vec<u8>, SerializationError> {
        match value {
            StreamValue::Bytes(b) => Ok(b.clone()),
            StreamValue::Null => Ok(Vec::new()),
            other => Err(SerializationError::UnsupportedValue {
                codec: "bytes".to_string(),
                reason: format!("expected a bytes value, got {}", other),
            }),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StreamValue, SerializationError> {
        Ok(StreamValue::Bytes(bytes.to_vec()))
    }

    fn name(&self) -> &'static str {
        "bytes"
    }
}
