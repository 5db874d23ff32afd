//! Windowed buffer for one side of a stream-stream join.
//!
//! Records are stored in a two-level structure: an outer map by join key and
//! an inner `BTreeMap` by event time, which keeps key lookup O(1) and time
//! range queries O(log n). Entries expire once older than window + retention
//! relative to the observed watermark.

use crate::rillstream::types::StreamValue;
use std::collections::{BTreeMap, HashMap};

/// One buffered value with its timing metadata.
#[derive(Debug, Clone)]
pub struct BufferedValue {
    pub value: StreamValue,
    pub event_time: i64,
    pub expire_at: i64,
}

/// Per-key, time-indexed buffer of past records for one join side.
#[derive(Debug, Default)]
pub struct JoinBuffer {
    entries: HashMap<StreamValue, BTreeMap<i64, Vec<BufferedValue>>>,
}

impl JoinBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        JoinBuffer {
            entries: HashMap::new(),
        }
    }

    /// Buffer a value under its key and event time; it expires at
    /// `event_time + retention_ms`.
    pub fn insert(&mut self, key: StreamValue, value: StreamValue, event_time: i64, retention_ms: i64) {
        let entry = BufferedValue {
            value,
            event_time,
            expire_at: event_time + retention_ms,
        };
        self.entries
            .entry(key)
            .or_default()
            .entry(event_time)
            .or_default()
            .push(entry);
    }

    /// All values for `key` with event time in `[from, to]`, oldest first.
    pub fn fetch_range(&self, key: &StreamValue, from: i64, to: i64) -> Vec<(i64, StreamValue)> {
        let Some(by_time) = self.entries.get(key) else {
            return Vec::new();
        };
        by_time
            .range(from..=to)
            .flat_map(|(ts, values)| values.iter().map(move |v| (*ts, v.value.clone())))
            .collect()
    }

    /// Drop every entry whose expiration lies before the watermark.
    pub fn evict(&mut self, watermark: i64) {
        self.entries.retain(|_, by_time| {
            by_time.retain(|_, values| {
                values.retain(|v| v.expire_at >= watermark);
                !values.is_empty()
            });
            !by_time.is_empty()
        });
    }

    /// Total buffered values across all keys.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|by_time| by_time.values())
            .map(Vec::len)
            .sum()
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_fetch_is_inclusive_and_ordered() {
        let mut buf = JoinBuffer::new();
        let key = StreamValue::String("k".into());
        buf.insert(key.clone(), StreamValue::Integer(1), 100, 1000);
        buf.insert(key.clone(), StreamValue::Integer(2), 200, 1000);
        buf.insert(key.clone(), StreamValue::Integer(3), 300, 1000);

        let hits = buf.fetch_range(&key, 100, 200);
        assert_eq!(
            hits,
            vec![(100, StreamValue::Integer(1)), (200, StreamValue::Integer(2))]
        );
    }

    #[test]
    fn eviction_drops_expired_entries() {
        let mut buf = JoinBuffer::new();
        let key = StreamValue::String("k".into());
        buf.insert(key.clone(), StreamValue::Integer(1), 100, 50);
        buf.insert(key.clone(), StreamValue::Integer(2), 500, 50);

        buf.evict(400);
        assert_eq!(buf.len(), 1);
        assert!(buf.fetch_range(&key, 0, 1000).contains(&(500, StreamValue::Integer(2))));
    }
}
