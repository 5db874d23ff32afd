//! Core record and value types.
//!
//! This module contains the fundamental data types flowing through a topology:
//! - [`StreamValue`] - The dynamic value type used for record keys and values
//! - [`Record`] - A timestamped key-value record

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A dynamically typed value carried as a record key or record value.
///
/// Operator logic (predicates, mappers, joiners, aggregators) is written
/// against this closed set of variants, so a single topology can mix
/// differently shaped records without generic type plumbing through every
/// node. `Null` doubles as the absence marker: a table update whose value
/// is `Null` deletes the key, and join logic receives `Null` for a missing
/// side.
#[derive(Debug, Clone)]
pub enum StreamValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Raw bytes (opaque payloads)
    Bytes(Vec<u8>),
    /// Absent value / tombstone
    Null,
    /// Ordered list of values
    Array(Vec<StreamValue>),
    /// String-keyed map of values
    Map(HashMap<String, StreamValue>),
}

impl StreamValue {
    /// Returns true for the `Null` variant.
    pub fn is_null(&self) -> bool {
        matches!(self, StreamValue::Null)
    }

    /// Returns the integer payload, if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the float payload, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            StreamValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for StreamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamValue::Null => write!(f, "NULL"),
            StreamValue::Integer(i) => write!(f, "{}", i),
            StreamValue::Float(v) => write!(f, "{}", v),
            StreamValue::String(s) => write!(f, "{}", s),
            StreamValue::Boolean(b) => write!(f, "{}", b),
            StreamValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            StreamValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            StreamValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Hash implementation so `StreamValue` can serve as a state-store key.
///
/// Floats hash by bit representation, which handles NaN, infinity and -0.0
/// without a partial-ordering escape hatch. Maps hash by sorted key order so
/// two equal maps hash equally regardless of iteration order.
impl Hash for StreamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            StreamValue::Integer(i) => i.hash(state),
            StreamValue::Float(f) => f.to_bits().hash(state),
            StreamValue::String(s) => s.hash(state),
            StreamValue::Boolean(b) => b.hash(state),
            StreamValue::Bytes(b) => b.hash(state),
            StreamValue::Null => {}
            StreamValue::Array(arr) => {
                for v in arr {
                    v.hash(state);
                }
            }
            StreamValue::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for k in keys {
                    k.hash(state);
                    map[k].hash(state);
                }
            }
        }
    }
}

/// Equality agrees with [`Hash`]: floats compare by bit representation, so
/// `Float(NAN) == Float(NAN)` and a NaN-keyed store entry can be looked up
/// again instead of fragmenting into a fresh entry per update.
impl PartialEq for StreamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StreamValue::Integer(a), StreamValue::Integer(b)) => a == b,
            (StreamValue::Float(a), StreamValue::Float(b)) => a.to_bits() == b.to_bits(),
            (StreamValue::String(a), StreamValue::String(b)) => a == b,
            (StreamValue::Boolean(a), StreamValue::Boolean(b)) => a == b,
            (StreamValue::Bytes(a), StreamValue::Bytes(b)) => a == b,
            (StreamValue::Null, StreamValue::Null) => true,
            (StreamValue::Array(a), StreamValue::Array(b)) => a == b,
            (StreamValue::Map(a), StreamValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StreamValue {}

impl From<i64> for StreamValue {
    fn from(v: i64) -> Self {
        StreamValue::Integer(v)
    }
}

impl From<f64> for StreamValue {
    fn from(v: f64) -> Self {
        StreamValue::Float(v)
    }
}

impl From<&str> for StreamValue {
    fn from(v: &str) -> Self {
        StreamValue::String(v.to_string())
    }
}

impl From<String> for StreamValue {
    fn from(v: String) -> Self {
        StreamValue::String(v)
    }
}

impl From<bool> for StreamValue {
    fn from(v: bool) -> Self {
        StreamValue::Boolean(v)
    }
}

/// Serialize as plain JSON-shaped data (numbers, strings, arrays, objects)
/// rather than as a tagged enum, so `JsonCodec` output is interoperable.
impl Serialize for StreamValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            StreamValue::Integer(i) => serializer.serialize_i64(*i),
            StreamValue::Float(f) => serializer.serialize_f64(*f),
            StreamValue::String(s) => serializer.serialize_str(s),
            StreamValue::Boolean(b) => serializer.serialize_bool(*b),
            StreamValue::Bytes(b) => serializer.serialize_bytes(b),
            StreamValue::Null => serializer.serialize_none(),
            StreamValue::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for v in arr {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            StreamValue::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

struct StreamValueVisitor;

impl<'de> Visitor<'de> for StreamValueVisitor {
    type Value = StreamValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON-compatible value")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<StreamValue, E> {
        Ok(StreamValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<StreamValue, E> {
        if v <= i64::MAX as u64 {
            Ok(StreamValue::Integer(v as i64))
        } else {
            Ok(StreamValue::Float(v as f64))
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<StreamValue, E> {
        Ok(StreamValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<StreamValue, E> {
        Ok(StreamValue::String(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<StreamValue, E> {
        Ok(StreamValue::Boolean(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<StreamValue, E> {
        Ok(StreamValue::Bytes(v.to_vec()))
    }

    fn visit_none<E: de::Error>(self) -> Result<StreamValue, E> {
        Ok(StreamValue::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<StreamValue, E> {
        Ok(StreamValue::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<StreamValue, A::Error> {
        let mut arr = Vec::new();
        while let Some(v) = seq.next_element()? {
            arr.push(v);
        }
        Ok(StreamValue::Array(arr))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<StreamValue, A::Error> {
        let mut out = HashMap::new();
        while let Some((k, v)) = map.next_entry::<String, StreamValue>()? {
            out.insert(k, v);
        }
        Ok(StreamValue::Map(out))
    }
}

impl<'de> Deserialize<'de> for StreamValue {
    fn deserialize<D>(deserializer: D) -> Result<StreamValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StreamValueVisitor)
    }
}

/// A single key-value record flowing through the topology.
///
/// Timestamps are milliseconds since the epoch and drive all windowing
/// decisions; the runtime's timestamp extractor (see
/// [`TopicConfig`](crate::rillstream::topic::TopicConfig)) decides how they
/// are assigned at the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record key; `Null` for unkeyed records
    pub key: StreamValue,
    /// Record value; `Null` is a tombstone when the record feeds a table
    pub value: StreamValue,
    /// Timestamp in milliseconds since epoch
    pub timestamp: i64,
}

impl Record {
    /// Creates a record with an explicit timestamp.
    pub fn new(key: impl Into<StreamValue>, value: impl Into<StreamValue>, timestamp: i64) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
            timestamp,
        }
    }
}
