//! JSON codec for `StreamValue` serialization/deserialization.
//!
//! Serializes directly via `StreamValue`'s `Serialize`/`Deserialize` impls,
//! so no intermediate `serde_json::Value` tree is built on either path.

use super::{Codec, SerializationError};
use crate::rillstream::types::StreamValue;

/// JSON codec producing plain JSON (numbers, strings, arrays, objects).
///
/// `Bytes` values are not representable in JSON and are rejected rather than
/// silently base64-encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JsonCodec
    pub fn new() -> Self {
        JsonCodec
    }
}

impl Codec for JsonCodec {
    fn serialize(&self, value: &StreamValue) -> Result<Vec<u8>, SerializationError> {
        if let StreamValue::Bytes(_) = value {
            return Err(SerializationError::UnsupportedValue {
                codec: "json".to_string(),
                reason: "raw bytes have no JSON representation".to_string(),
            });
        }
        serde_json::to_vec(value)
            .map_err(|e| SerializationError::json_error("Failed to serialize to JSON", e))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StreamValue, SerializationError> {
        serde_json::from_slice(bytes)
            .map_err(|e| SerializationError::json_error("Failed to parse JSON", e))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn round_trips_maps() {
        let mut map = HashMap::new();
        map.insert("qty".to_string(), StreamValue::Integer(3));
        map.insert("sym".to_string(), StreamValue::String("AAPL".to_string()));
        let value = StreamValue::Map(map);

        let codec = JsonCodec::new();
        let bytes = codec.serialize(&value).unwrap();
        assert_eq!(codec.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn rejects_bytes_values() {
        let codec = JsonCodec::new();
        let err = codec.serialize(&StreamValue::Bytes(vec![1, 2, 3]));
        assert!(err.is_err());
    }
}
