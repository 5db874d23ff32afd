//! Synchronous in-memory topology execution for tests.

use crate::rillstream::state::{KeyValueStore, ProcessorContext};
use crate::rillstream::table::ChangeEvent;
use crate::rillstream::test_harness::join_buffer::JoinBuffer;
use crate::rillstream::topology::node::{JoinKind, NodeId, NodeKind, ProcessorLogic, TableJoinKind};
use crate::rillstream::topology::Topology;
use crate::rillstream::types::{Record, StreamValue};
use log::warn;
use std::collections::HashMap;

/// A record or a changelog update travelling along one edge of the graph.
///
/// Stream-valued nodes exchange `Record`s; table-valued nodes exchange
/// `Change`s carrying both the superseded and the new value, which is what
/// lets a downstream re-aggregation un-do the old value on its old key.
#[derive(Debug, Clone)]
enum Flow {
    Record(Record),
    Change(ChangeEvent),
}

/// Executes a compiled topology synchronously in memory.
///
/// Records piped into a source topic propagate depth-first through the DAG;
/// sink writes are captured per topic and additionally looped back into any
/// source consuming the same topic, which is what makes `through` and
/// internal repartition topics behave like real round trips.
///
/// # Examples
///
/// ```rust
/// use rillstream::rillstream::topology::TopologyBuilder;
/// use rillstream::rillstream::topic::TopicConfig;
/// use rillstream::rillstream::serialization::{JsonCodec, StringCodec};
/// use rillstream::rillstream::test_harness::TopologyTestDriver;
/// use rillstream::rillstream::types::Record;
///
/// let builder = TopologyBuilder::new("app")
///     .default_key_codec(StringCodec)
///     .default_value_codec(JsonCodec::new());
/// let stream = builder.stream(TopicConfig::new("in"))?;
/// stream.map_values(|v| v.clone()).to(TopicConfig::new("out"))?;
///
/// let mut driver = TopologyTestDriver::new(builder.build()?);
/// driver.pipe_input("in", Record::new("k", 1i64, 0));
/// assert_eq!(driver.read_output("out").len(), 1);
/// # Ok::<(), rillstream::rillstream::error::TopologyError>(())
/// ```
pub struct TopologyTestDriver {
    topology: Topology,
    kv_stores: HashMap<String, KeyValueStore>,
    join_buffers: HashMap<String, JoinBuffer>,
    reduce_bags: HashMap<String, HashMap<StreamValue, Vec<StreamValue>>>,
    outputs: HashMap<String, Vec<Record>>,
    sources_by_topic: HashMap<String, Vec<NodeId>>,
    loopback_depth: usize,
}

/// Longest chain of sink-to-source re-deliveries followed for one input
/// record. Legitimate topologies nest one level per `through` or internal
/// repartition topic; a topology that writes to its own source topic would
/// otherwise recurse forever.
const MAX_LOOPBACK_DEPTH: usize = 64;

impl TopologyTestDriver {
    /// Driver over a compiled topology with empty stores and outputs.
    pub fn new(topology: Topology) -> Self {
        let mut sources_by_topic: HashMap<String, Vec<NodeId>> = HashMap::new();
        for id in topology.sources() {
            if let NodeKind::Source { topics, .. } = &topology.node(id).kind {
                for topic in topics {
                    sources_by_topic.entry(topic.clone()).or_default().push(id);
                }
            }
        }
        let kv_stores = topology
            .stores()
            .iter()
            .map(|s| (s.name().to_string(), KeyValueStore::new()))
            .collect();
        TopologyTestDriver {
            topology,
            kv_stores,
            join_buffers: HashMap::new(),
            reduce_bags: HashMap::new(),
            outputs: HashMap::new(),
            sources_by_topic,
            loopback_depth: 0,
        }
    }

    /// Pipe one record into every source consuming `topic`.
    pub fn pipe_input(&mut self, topic: &str, record: Record) {
        let sources = self
            .sources_by_topic
            .get(topic)
            .cloned()
            .unwrap_or_default();
        if sources.is_empty() {
            warn!("no source consumes topic '{}'; record dropped", topic);
        }
        for source in sources {
            let mut record = record.clone();
            if let NodeKind::Source { config, .. } = &self.topology.node(source).kind {
                if let Some(extractor) = config.timestamp_extractor_ref() {
                    record.timestamp = extractor(&record);
                }
            }
            self.forward(source, &Flow::Record(record));
        }
    }

    /// Drain and return everything written to a sink topic so far.
    pub fn read_output(&mut self, topic: &str) -> Vec<Record> {
        self.outputs.remove(topic).unwrap_or_default()
    }

    /// Inspect a key-value store by name.
    pub fn key_value_store(&self, name: &str) -> Option<&KeyValueStore> {
        self.kv_stores.get(name)
    }

    fn forward(&mut self, from: NodeId, flow: &Flow) {
        let children: Vec<NodeId> = self.topology.children(from).to_vec();
        for child in children {
            match &self.topology.node(child).kind {
                NodeKind::Sink { topic, .. } => {
                    // Only record-valued edges reach sinks.
                    if let Flow::Record(record) = flow {
                        let topic = topic.clone();
                        self.outputs
                            .entry(topic.clone())
                            .or_default()
                            .push(record.clone());
                        // Loop sink writes back into any source reading the
                        // same topic (through / repartition round trips).
                        if self.sources_by_topic.contains_key(&topic) {
                            if self.loopback_depth >= MAX_LOOPBACK_DEPTH {
                                warn!(
                                    "loopback depth limit ({}) reached on topic '{}'; \
                                     record not re-delivered",
                                    MAX_LOOPBACK_DEPTH, topic
                                );
                            } else {
                                self.loopback_depth += 1;
                                self.pipe_input(&topic, record.clone());
                                self.loopback_depth -= 1;
                            }
                        }
                    }
                }
                NodeKind::Processor { .. } => {
                    let outputs = self.apply(child, from, flow);
                    for out in outputs {
                        self.forward(child, &out);
                    }
                }
                NodeKind::Source { .. } => unreachable!("sources have no parents"),
            }
        }
    }

    fn apply(&mut self, node: NodeId, from: NodeId, flow: &Flow) -> Vec<Flow> {
        let (logic, inputs) = match &self.topology.node(node).kind {
            NodeKind::Processor { logic, inputs } => (logic.clone(), inputs.clone()),
            _ => return Vec::new(),
        };
        match logic {
            ProcessorLogic::Filter { predicate, negate } => {
                record_in(flow)
                    .filter(|r| predicate(&r.key, &r.value) != negate)
                    .map(|r| Flow::Record(r.clone()))
                    .into_iter()
                    .collect()
            }
            ProcessorLogic::Map { mapper } => record_in(flow)
                .map(|r| {
                    let (key, value) = mapper(&r.key, &r.value);
                    Flow::Record(Record {
                        key,
                        value,
                        timestamp: r.timestamp,
                    })
                })
                .into_iter()
                .collect(),
            ProcessorLogic::MapValues { mapper } => record_in(flow)
                .map(|r| {
                    Flow::Record(Record {
                        key: r.key.clone(),
                        value: mapper(&r.value),
                        timestamp: r.timestamp,
                    })
                })
                .into_iter()
                .collect(),
            ProcessorLogic::FlatMap { mapper } => record_in(flow)
                .map(|r| {
                    mapper(&r.key, &r.value)
                        .into_iter()
                        .map(|(key, value)| {
                            Flow::Record(Record {
                                key,
                                value,
                                timestamp: r.timestamp,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            ProcessorLogic::FlatMapValues { mapper } => record_in(flow)
                .map(|r| {
                    mapper(&r.value)
                        .into_iter()
                        .map(|value| {
                            Flow::Record(Record {
                                key: r.key.clone(),
                                value,
                                timestamp: r.timestamp,
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            ProcessorLogic::SelectKey { mapper } => record_in(flow)
                .map(|r| {
                    Flow::Record(Record {
                        key: mapper(&r.key, &r.value),
                        value: r.value.clone(),
                        timestamp: r.timestamp,
                    })
                })
                .into_iter()
                .collect(),
            ProcessorLogic::BranchArm { predicates, index } => record_in(flow)
                .filter(|r| {
                    predicates
                        .iter()
                        .position(|p| p(&r.key, &r.value))
                        == Some(index)
                })
                .map(|r| Flow::Record(r.clone()))
                .into_iter()
                .collect(),
            ProcessorLogic::Merge => vec![flow.clone()],
            ProcessorLogic::ForEach { action } => {
                if let Some(r) = record_in(flow) {
                    action(&r.key, &r.value);
                }
                Vec::new()
            }
            ProcessorLogic::Process { processor, stores } => {
                if let Some(r) = record_in(flow).cloned() {
                    self.with_context(&stores, r.timestamp, |ctx| {
                        processor(ctx, &r.key, &r.value);
                    });
                }
                Vec::new()
            }
            ProcessorLogic::Transform {
                transformer,
                stores,
            } => {
                let Some(r) = record_in(flow).cloned() else {
                    return Vec::new();
                };
                let pairs = self.with_context(&stores, r.timestamp, |ctx| {
                    transformer(ctx, &r.key, &r.value)
                });
                pairs
                    .into_iter()
                    .map(|(key, value)| {
                        Flow::Record(Record {
                            key,
                            value,
                            timestamp: r.timestamp,
                        })
                    })
                    .collect()
            }
            ProcessorLogic::TransformValues {
                transformer,
                stores,
            } => {
                let Some(r) = record_in(flow).cloned() else {
                    return Vec::new();
                };
                let value = self.with_context(&stores, r.timestamp, |ctx| {
                    transformer(ctx, &r.key, &r.value)
                });
                vec![Flow::Record(Record {
                    key: r.key,
                    value,
                    timestamp: r.timestamp,
                })]
            }
            ProcessorLogic::Aggregate {
                store,
                initializer,
                aggregator,
            } => {
                let Some(r) = record_in(flow) else {
                    return Vec::new();
                };
                if r.key.is_null() || r.value.is_null() {
                    return Vec::new();
                }
                let kv = self.kv_stores.entry(store).or_default();
                let old = kv.get(&r.key).cloned();
                let prev = old.clone().unwrap_or_else(|| initializer());
                let next = aggregator(&r.key, &r.value, &prev);
                kv.put(r.key.clone(), next.clone());
                vec![Flow::Change(ChangeEvent {
                    key: r.key.clone(),
                    old_value: old,
                    new_value: Some(next),
                    timestamp: r.timestamp,
                })]
            }
            ProcessorLogic::WindowedAggregate {
                store,
                windows,
                initializer,
                aggregator,
            } => {
                let Some(r) = record_in(flow) else {
                    return Vec::new();
                };
                if r.key.is_null() || r.value.is_null() {
                    return Vec::new();
                }
                let mut changes = Vec::new();
                for start in windows.windows_for(r.timestamp) {
                    let windowed_key =
                        StreamValue::Array(vec![r.key.clone(), StreamValue::Integer(start)]);
                    let kv = self.kv_stores.entry(store.clone()).or_default();
                    let old = kv.get(&windowed_key).cloned();
                    let prev = old.clone().unwrap_or_else(|| initializer());
                    let next = aggregator(&r.key, &r.value, &prev);
                    kv.put(windowed_key.clone(), next.clone());
                    changes.push(Flow::Change(ChangeEvent {
                        key: windowed_key,
                        old_value: old,
                        new_value: Some(next),
                        timestamp: r.timestamp,
                    }));
                }
                changes
            }
            ProcessorLogic::StreamJoin {
                kind,
                windows,
                joiner,
                left_store,
                right_store,
            } => {
                let Some(r) = record_in(flow) else {
                    return Vec::new();
                };
                if r.key.is_null() || r.value.is_null() {
                    return Vec::new();
                }
                let from_left = from == inputs[0];
                let (this_store, other_store) = if from_left {
                    (left_store, right_store)
                } else {
                    (right_store, left_store)
                };
                let size = windows.size_ms();
                let retention = size + windows.retention_ms();
                let watermark = r.timestamp - retention;

                let this_buf = self.join_buffers.entry(this_store).or_default();
                this_buf.evict(watermark);
                this_buf.insert(r.key.clone(), r.value.clone(), r.timestamp, retention);

                let other_buf = self.join_buffers.entry(other_store).or_default();
                other_buf.evict(watermark);
                let matches =
                    other_buf.fetch_range(&r.key, r.timestamp - size, r.timestamp + size);

                let mut out = Vec::new();
                for (match_ts, match_value) in &matches {
                    let value = if from_left {
                        joiner(&r.value, match_value)
                    } else {
                        joiner(match_value, &r.value)
                    };
                    out.push(Flow::Record(Record {
                        key: r.key.clone(),
                        value,
                        timestamp: r.timestamp.max(*match_ts),
                    }));
                }
                if matches.is_empty() {
                    let emit_unmatched = match kind {
                        JoinKind::Inner => false,
                        JoinKind::Left => from_left,
                        JoinKind::Outer => true,
                    };
                    if emit_unmatched {
                        let value = if from_left {
                            joiner(&r.value, &StreamValue::Null)
                        } else {
                            joiner(&StreamValue::Null, &r.value)
                        };
                        out.push(Flow::Record(Record {
                            key: r.key.clone(),
                            value,
                            timestamp: r.timestamp,
                        }));
                    }
                }
                out
            }
            ProcessorLogic::StreamTableJoin {
                joiner,
                table_store,
            } => {
                // Table-side updates only refresh the store; lookups are
                // always "as of now" from the stream side.
                if from != inputs[0] {
                    return Vec::new();
                }
                let Some(r) = record_in(flow) else {
                    return Vec::new();
                };
                if r.key.is_null() {
                    return Vec::new();
                }
                let other = self
                    .kv_stores
                    .get(&table_store)
                    .and_then(|kv| kv.get(&r.key).cloned())
                    .unwrap_or(StreamValue::Null);
                vec![Flow::Record(Record {
                    key: r.key.clone(),
                    value: joiner(&r.value, &other),
                    timestamp: r.timestamp,
                })]
            }
            ProcessorLogic::TableSource { store } => {
                let Some(r) = record_in(flow) else {
                    return Vec::new();
                };
                if r.key.is_null() {
                    return Vec::new();
                }
                let kv = self.kv_stores.entry(store).or_default();
                let old = kv.put(r.key.clone(), r.value.clone());
                let new = if r.value.is_null() {
                    None
                } else {
                    Some(r.value.clone())
                };
                vec![Flow::Change(ChangeEvent {
                    key: r.key.clone(),
                    old_value: old,
                    new_value: new,
                    timestamp: r.timestamp,
                })]
            }
            ProcessorLogic::TableJoin {
                kind,
                joiner,
                left_store,
                right_store,
                store,
            } => {
                let Some(change) = change_in(flow) else {
                    return Vec::new();
                };
                let key = change.key.clone();
                let left = self
                    .kv_stores
                    .get(&left_store)
                    .and_then(|kv| kv.get(&key).cloned());
                let right = self
                    .kv_stores
                    .get(&right_store)
                    .and_then(|kv| kv.get(&key).cloned());
                let result = match kind {
                    TableJoinKind::Inner => match (&left, &right) {
                        (Some(l), Some(r)) => Some(joiner(l, r)),
                        _ => None,
                    },
                    TableJoinKind::Outer => {
                        if left.is_none() && right.is_none() {
                            None
                        } else {
                            Some(joiner(
                                left.as_ref().unwrap_or(&StreamValue::Null),
                                right.as_ref().unwrap_or(&StreamValue::Null),
                            ))
                        }
                    }
                };
                let kv = self.kv_stores.entry(store).or_default();
                let old = match &result {
                    Some(v) => kv.put(key.clone(), v.clone()),
                    None => kv.delete(&key),
                };
                if old.is_none() && result.is_none() {
                    return Vec::new();
                }
                vec![Flow::Change(ChangeEvent {
                    key,
                    old_value: old,
                    new_value: result,
                    timestamp: change.timestamp,
                })]
            }
            ProcessorLogic::TableGroupBy { mapper } => {
                let Some(change) = change_in(flow) else {
                    return Vec::new();
                };
                let mut out = Vec::new();
                // Un-do the superseded value on its old grouping key, then
                // re-do the new value on its new one.
                if let Some(old) = &change.old_value {
                    let (key, value) = mapper(&change.key, old);
                    out.push(Flow::Change(ChangeEvent {
                        key,
                        old_value: Some(value),
                        new_value: None,
                        timestamp: change.timestamp,
                    }));
                }
                if let Some(new) = &change.new_value {
                    let (key, value) = mapper(&change.key, new);
                    out.push(Flow::Change(ChangeEvent {
                        key,
                        old_value: None,
                        new_value: Some(value),
                        timestamp: change.timestamp,
                    }));
                }
                out
            }
            ProcessorLogic::TableAggregate {
                store,
                initializer,
                adder,
                subtractor,
            } => {
                let Some(change) = change_in(flow) else {
                    return Vec::new();
                };
                let key = change.key.clone();
                let kv = self.kv_stores.entry(store).or_default();
                let stored = kv.get(&key).cloned();
                let mut agg = stored.clone().unwrap_or_else(|| initializer());
                if let Some(old) = &change.old_value {
                    agg = subtractor(&key, old, &agg);
                }
                if let Some(new) = &change.new_value {
                    agg = adder(&key, new, &agg);
                }
                kv.put(key.clone(), agg.clone());
                vec![Flow::Change(ChangeEvent {
                    key,
                    old_value: stored,
                    new_value: Some(agg),
                    timestamp: change.timestamp,
                })]
            }
            ProcessorLogic::TableReduce { store, reducer } => {
                let Some(change) = change_in(flow) else {
                    return Vec::new();
                };
                let key = change.key.clone();
                let bag = self
                    .reduce_bags
                    .entry(store.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default();
                if let Some(old) = &change.old_value {
                    if let Some(pos) = bag.iter().position(|v| v == old) {
                        bag.remove(pos);
                    }
                }
                if let Some(new) = &change.new_value {
                    bag.push(new.clone());
                }
                let refolded = bag
                    .split_first()
                    .map(|(first, rest)| rest.iter().fold(first.clone(), |acc, v| reducer(&acc, v)));
                let kv = self.kv_stores.entry(store).or_default();
                let old = match &refolded {
                    Some(v) => kv.put(key.clone(), v.clone()),
                    None => kv.delete(&key),
                };
                if old.is_none() && refolded.is_none() {
                    return Vec::new();
                }
                vec![Flow::Change(ChangeEvent {
                    key,
                    old_value: old,
                    new_value: refolded,
                    timestamp: change.timestamp,
                })]
            }
            ProcessorLogic::TableToStream { key_mapper } => {
                let Some(change) = change_in(flow) else {
                    return Vec::new();
                };
                let value = change.new_value.clone().unwrap_or(StreamValue::Null);
                let key = match &key_mapper {
                    Some(mapper) => mapper(&change.key, &value),
                    None => change.key.clone(),
                };
                vec![Flow::Record(Record {
                    key,
                    value,
                    timestamp: change.timestamp,
                })]
            }
        }
    }

    /// Run `f` with mutable access to the named stores, detaching them from
    /// the driver for the duration of the call.
    fn with_context<T>(
        &mut self,
        stores: &[String],
        timestamp: i64,
        f: impl FnOnce(&mut ProcessorContext) -> T,
    ) -> T {
        let mut taken: Vec<(String, KeyValueStore)> = stores
            .iter()
            .map(|name| {
                let store = self.kv_stores.remove(name).unwrap_or_default();
                (name.clone(), store)
            })
            .collect();
        let result = {
            let map: HashMap<&str, &mut KeyValueStore> = taken
                .iter_mut()
                .map(|(name, store)| (name.as_str(), store))
                .collect();
            let mut ctx = ProcessorContext::new(map, timestamp);
            f(&mut ctx)
        };
        for (name, store) in taken {
            self.kv_stores.insert(name, store);
        }
        result
    }
}

fn record_in(flow: &Flow) -> Option<&Record> {
    match flow {
        Flow::Record(r) => Some(r),
        Flow::Change(_) => None,
    }
}

fn change_in(flow: &Flow) -> Option<&ChangeEvent> {
    match flow {
        Flow::Change(c) => Some(c),
        Flow::Record(_) => None,
    }
}
