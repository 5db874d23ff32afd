//! State store declarations and the key-value store surface exposed to
//! custom processors.
//!
//! Declarations are what the topology carries: name plus codecs, registered
//! implicitly by every table-producing operator and explicitly via
//! [`TopologyBuilder::add_state_store`](crate::rillstream::topology::TopologyBuilder::add_state_store)
//! for `process`/`transform` logic. The in-memory [`KeyValueStore`] is the
//! store implementation the test driver executes against; a production
//! runtime supplies its own durable equivalent behind the same shape.

use crate::rillstream::serialization::{Codec, CodecRef};
use crate::rillstream::types::StreamValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declaration of a named state store: {name, key codec, value codec}.
#[derive(Clone)]
pub struct StateStoreConfig {
    name: String,
    key_codec: Option<CodecRef>,
    value_codec: Option<CodecRef>,
}

impl StateStoreConfig {
    /// Declare a store with codecs resolved later from builder defaults.
    pub fn new(name: impl Into<String>) -> Self {
        StateStoreConfig {
            name: name.into(),
            key_codec: None,
            value_codec: None,
        }
    }

    /// Set the key codec.
    pub fn key_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.key_codec = Some(Arc::new(codec));
        self
    }

    /// Set the value codec.
    pub fn value_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.value_codec = Some(Arc::new(codec));
        self
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fill unset codecs from builder-level defaults.
    pub(crate) fn with_codec_defaults(
        mut self,
        key: Option<&CodecRef>,
        value: Option<&CodecRef>,
    ) -> Self {
        if self.key_codec.is_none() {
            self.key_codec = key.cloned();
        }
        if self.value_codec.is_none() {
            self.value_codec = value.cloned();
        }
        self
    }

    /// Key codec, if set.
    pub fn key_codec_ref(&self) -> Option<&CodecRef> {
        self.key_codec.as_ref()
    }

    /// Value codec, if set.
    pub fn value_codec_ref(&self) -> Option<&CodecRef> {
        self.value_codec.as_ref()
    }
}

impl fmt::Debug for StateStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStoreConfig")
            .field("name", &self.name)
            .field("key_codec", &self.key_codec.as_ref().map(|c| c.name()))
            .field("value_codec", &self.value_codec.as_ref().map(|c| c.name()))
            .finish()
    }
}

/// In-memory keyed latest-value store.
#[derive(Debug, Default, Clone)]
pub struct KeyValueStore {
    entries: HashMap<StreamValue, StreamValue>,
}

impl KeyValueStore {
    /// Empty store.
    pub fn new() -> Self {
        KeyValueStore {
            entries: HashMap::new(),
        }
    }

    /// Current value for a key.
    pub fn get(&self, key: &StreamValue) -> Option<&StreamValue> {
        self.entries.get(key)
    }

    /// Insert or replace; a `Null` value deletes the key (tombstone).
    /// Returns the previous value.
    pub fn put(&mut self, key: StreamValue, value: StreamValue) -> Option<StreamValue> {
        if value.is_null() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, value)
        }
    }

    /// Remove a key, returning its prior value.
    pub fn delete(&mut self, key: &StreamValue) -> Option<StreamValue> {
        self.entries.remove(key)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &StreamValue) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries. Use with caution for large stores.
    pub fn snapshot(&self) -> HashMap<StreamValue, StreamValue> {
        self.entries.clone()
    }
}

/// Mutable store access handed to `process`/`transform` logic.
///
/// Only stores the operator declared at registration time are reachable;
/// asking for any other name yields `None`.
pub struct ProcessorContext<'a> {
    stores: HashMap<&'a str, &'a mut KeyValueStore>,
    timestamp: i64,
}

impl<'a> ProcessorContext<'a> {
    /// Build a context over the given stores for one record invocation.
    pub fn new(stores: HashMap<&'a str, &'a mut KeyValueStore>, timestamp: i64) -> Self {
        ProcessorContext { stores, timestamp }
    }

    /// Mutable access to a declared store by name.
    pub fn store_mut(&mut self, name: &str) -> Option<&mut KeyValueStore> {
        self.stores.get_mut(name).map(|s| &mut **s)
    }

    /// Timestamp of the record being processed (millis).
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_value_is_a_tombstone() {
        let mut store = KeyValueStore::new();
        store.put(StreamValue::String("a".into()), StreamValue::Integer(1));
        assert_eq!(store.len(), 1);

        store.put(StreamValue::String("a".into()), StreamValue::Null);
        assert!(store.is_empty());
    }
}
