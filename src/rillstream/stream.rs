//! The record-stream abstraction and its operators.
//!
//! A [`KStream`] is a lightweight handle over one point of the builder's
//! graph: (shared builder reference, terminal node id). Every transformation
//! registers a new node wired to its parent(s) and returns a new handle; the
//! original handle stays valid, so using one handle twice fans the stream
//! out to independent children.
//!
//! Operators that may change the key (`map`, `flat_map`, `select_key`,
//! `transform`) mark the resulting stream as needing a repartition; the next
//! stateful operator (grouping, joins) then inserts a write/re-read through
//! an internal `<app-id>-<name>-repartition` topic so same-key records meet
//! on the same partition. `through` clears the mark, since it guarantees the
//! returned stream reflects the topic's partitioning.

use crate::rillstream::error::{TopologyError, TopologyResult};
use crate::rillstream::state::{ProcessorContext, StateStoreConfig};
use crate::rillstream::table::KTable;
use crate::rillstream::topic::TopicConfig;
use crate::rillstream::topology::node::{
    JoinKind, NodeId, Predicate, ProcessorLogic,
};
use crate::rillstream::topology::BuilderInner;
use crate::rillstream::types::StreamValue;
use crate::rillstream::window::Windows;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A handle to an unbounded sequence of key-value records at one point of
/// the topology graph.
#[derive(Clone)]
pub struct KStream {
    inner: Rc<RefCell<BuilderInner>>,
    node: NodeId,
    repartition_required: bool,
}

impl fmt::Debug for KStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KStream")
            .field("node", &self.node)
            .field("repartition_required", &self.repartition_required)
            .finish()
    }
}

impl KStream {
    pub(crate) fn new(inner: Rc<RefCell<BuilderInner>>, node: NodeId) -> Self {
        KStream {
            inner,
            node,
            repartition_required: false,
        }
    }

    pub(crate) fn new_with_repartition(
        inner: Rc<RefCell<BuilderInner>>,
        node: NodeId,
        repartition_required: bool,
    ) -> Self {
        KStream {
            inner,
            node,
            repartition_required,
        }
    }

    pub(crate) fn builder(&self) -> &Rc<RefCell<BuilderInner>> {
        &self.inner
    }

    /// Id of the node whose output this handle denotes.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether a repartition is pending before the next stateful operator.
    pub fn repartition_required(&self) -> bool {
        self.repartition_required
    }

    /// Register a unary processor and return the handle over it.
    fn derive(&self, prefix: &str, logic: ProcessorLogic, repartition: bool) -> KStream {
        let mut inner = self.inner.borrow_mut();
        let name = inner.new_name(prefix);
        let node = inner.add_processor(name, logic, vec![self.node]);
        drop(inner);
        KStream {
            inner: self.inner.clone(),
            node,
            repartition_required: repartition,
        }
    }

    /// Insert a sink/source pair through an internal repartition topic when
    /// an upstream operator changed the key. No-op otherwise.
    fn repartition_if_needed(&self, hint: &str) -> TopologyResult<KStream> {
        if !self.repartition_required {
            return Ok(self.clone());
        }
        let mut inner = self.inner.borrow_mut();
        let topic = format!("{}-{}-repartition", inner.application_id(), hint);
        let config = inner.resolve_topic_config(TopicConfig::new(topic.clone()), hint)?;
        let sink_name = inner.new_name("KSTREAM-REPARTITION-SINK");
        inner.add_sink(sink_name, topic, config.clone(), self.node);
        let source_name = inner.new_name("KSTREAM-REPARTITION-SOURCE");
        let node = inner.add_source(source_name, config);
        drop(inner);
        Ok(KStream::new(self.inner.clone(), node))
    }

    fn ensure_same_builder(&self, other: &Rc<RefCell<BuilderInner>>, operator: &str) -> TopologyResult<()> {
        if Rc::ptr_eq(&self.inner, other) {
            Ok(())
        } else {
            Err(TopologyError::ForeignHandle {
                operator: operator.to_string(),
            })
        }
    }

    // ---- stateless operators ----

    /// Pass through records satisfying the predicate.
    pub fn filter(
        &self,
        predicate: impl Fn(&StreamValue, &StreamValue) -> bool + Send + Sync + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-FILTER",
            ProcessorLogic::Filter {
                predicate: Arc::new(predicate),
                negate: false,
            },
            self.repartition_required,
        )
    }

    /// Pass through records *not* satisfying the predicate.
    pub fn filter_not(
        &self,
        predicate: impl Fn(&StreamValue, &StreamValue) -> bool + Send + Sync + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-FILTER",
            ProcessorLogic::Filter {
                predicate: Arc::new(predicate),
                negate: true,
            },
            self.repartition_required,
        )
    }

    /// One output record per input; key and value may both change, so the
    /// result needs repartitioning before stateful use.
    pub fn map(
        &self,
        mapper: impl Fn(&StreamValue, &StreamValue) -> (StreamValue, StreamValue)
            + Send
            + Sync
            + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-MAP",
            ProcessorLogic::Map {
                mapper: Arc::new(mapper),
            },
            true,
        )
    }

    /// One output record per input, changing only the value. Preserves the
    /// key and therefore partition assignment.
    pub fn map_values(
        &self,
        mapper: impl Fn(&StreamValue) -> StreamValue + Send + Sync + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-MAPVALUES",
            ProcessorLogic::MapValues {
                mapper: Arc::new(mapper),
            },
            self.repartition_required,
        )
    }

    /// Zero, one or many output records per input, each independently keyed.
    pub fn flat_map(
        &self,
        mapper: impl Fn(&StreamValue, &StreamValue) -> Vec<(StreamValue, StreamValue)>
            + Send
            + Sync
            + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-FLATMAP",
            ProcessorLogic::FlatMap {
                mapper: Arc::new(mapper),
            },
            true,
        )
    }

    /// Zero, one or many output values per input, key preserved.
    pub fn flat_map_values(
        &self,
        mapper: impl Fn(&StreamValue) -> Vec<StreamValue> + Send + Sync + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-FLATMAPVALUES",
            ProcessorLogic::FlatMapValues {
                mapper: Arc::new(mapper),
            },
            self.repartition_required,
        )
    }

    /// Recompute the key from the existing key-value pair. Marks the stream
    /// for repartitioning at the next stateful operator.
    pub fn select_key(
        &self,
        mapper: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
    ) -> KStream {
        self.derive(
            "KSTREAM-KEY-SELECT",
            ProcessorLogic::SelectKey {
                mapper: Arc::new(mapper),
            },
            true,
        )
    }

    /// Route each record to the first predicate it matches, one returned
    /// stream per predicate in the supplied order. Records matching no
    /// predicate are dropped.
    pub fn branch(&self, predicates: Vec<Predicate>) -> TopologyResult<Vec<KStream>> {
        if predicates.is_empty() {
            return Err(TopologyError::InvalidOperator {
                operator: "branch".to_string(),
                reason: "at least one predicate is required".to_string(),
            });
        }
        let predicates = Arc::new(predicates);
        let mut branches = Vec::with_capacity(predicates.len());
        for index in 0..predicates.len() {
            branches.push(self.derive(
                "KSTREAM-BRANCH",
                ProcessorLogic::BranchArm {
                    predicates: predicates.clone(),
                    index,
                },
                self.repartition_required,
            ));
        }
        Ok(branches)
    }

    // ---- topic plumbing ----

    /// Write the stream to a topic and immediately re-read it as a new
    /// source. Forces repartitioning: the returned stream reflects the
    /// topic's partitioning, so the pending-repartition mark is cleared.
    pub fn through(&self, config: TopicConfig) -> TopologyResult<KStream> {
        let mut inner = self.inner.borrow_mut();
        let config = inner.resolve_topic_config(config, "through")?;
        let topic = config.topics()[0].clone();
        let sink_name = inner.new_name("KSTREAM-SINK");
        inner.add_sink(sink_name, topic, config.clone(), self.node);
        let source_name = inner.new_name("KSTREAM-SOURCE");
        let node = inner.add_source(source_name, config);
        drop(inner);
        Ok(KStream::new(self.inner.clone(), node))
    }

    /// Terminal sink: write the stream to a topic.
    pub fn to(&self, config: TopicConfig) -> TopologyResult<()> {
        let mut inner = self.inner.borrow_mut();
        let config = inner.resolve_topic_config(config, "to")?;
        let topic = config.topics()[0].clone();
        let name = inner.new_name("KSTREAM-SINK");
        inner.add_sink(name, topic, config, self.node);
        Ok(())
    }

    // ---- terminal / escape-hatch operators ----

    /// Terminal side effect for every record.
    pub fn for_each(&self, action: impl Fn(&StreamValue, &StreamValue) + Send + Sync + 'static) {
        self.derive(
            "KSTREAM-FOREACH",
            ProcessorLogic::ForEach {
                action: Arc::new(action),
            },
            self.repartition_required,
        );
    }

    /// Terminal stateful side logic with access to the named stores, which
    /// must be declared via `TopologyBuilder::add_state_store` before build.
    pub fn process(
        &self,
        processor: impl Fn(&mut ProcessorContext, &StreamValue, &StreamValue) + Send + Sync + 'static,
        stores: Vec<String>,
    ) {
        self.derive(
            "KSTREAM-PROCESSOR",
            ProcessorLogic::Process {
                processor: Arc::new(processor),
                stores,
            },
            self.repartition_required,
        );
    }

    /// General stateful record transformation: per input record, emit zero
    /// or more output records with access to the named stores. The most
    /// general operator; the stateless ones are convenience specializations.
    pub fn transform(
        &self,
        transformer: impl Fn(&mut ProcessorContext, &StreamValue, &StreamValue) -> Vec<(StreamValue, StreamValue)>
            + Send
            + Sync
            + 'static,
        stores: Vec<String>,
    ) -> KStream {
        self.derive(
            "KSTREAM-TRANSFORM",
            ProcessorLogic::Transform {
                transformer: Arc::new(transformer),
                stores,
            },
            true,
        )
    }

    /// Stateful value transformation, key preserved.
    pub fn transform_values(
        &self,
        transformer: impl Fn(&mut ProcessorContext, &StreamValue, &StreamValue) -> StreamValue
            + Send
            + Sync
            + 'static,
        stores: Vec<String>,
    ) -> KStream {
        self.derive(
            "KSTREAM-TRANSFORMVALUES",
            ProcessorLogic::TransformValues {
                transformer: Arc::new(transformer),
                stores,
            },
            self.repartition_required,
        )
    }

    // ---- aggregation into tables ----

    /// Fold all records sharing a key into one running value in a new table
    /// backed by `store_name`. Repartitions first if the key was changed
    /// upstream.
    pub fn aggregate_by_key(
        &self,
        initializer: impl Fn() -> StreamValue + Send + Sync + 'static,
        aggregator: impl Fn(&StreamValue, &StreamValue, &StreamValue) -> StreamValue
            + Send
            + Sync
            + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let store_name = store_name.into();
        let grouped = self.repartition_if_needed(&store_name)?;
        let mut inner = grouped.inner.borrow_mut();
        inner.register_store(StateStoreConfig::new(store_name.clone()), "aggregate_by_key")?;
        let name = inner.new_name("KSTREAM-AGGREGATE");
        let node = inner.add_processor(
            name,
            ProcessorLogic::Aggregate {
                store: store_name.clone(),
                initializer: Arc::new(initializer),
                aggregator: Arc::new(aggregator),
            },
            vec![grouped.node],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }

    /// Combine all records sharing a key with an associative reducer; the
    /// first value per key seeds the running value.
    pub fn reduce_by_key(
        &self,
        reducer: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let reducer = Arc::new(reducer);
        self.aggregate_by_key(
            || StreamValue::Null,
            move |_key, value, agg| {
                if agg.is_null() {
                    value.clone()
                } else {
                    reducer(agg, value)
                }
            },
            store_name,
        )
    }

    /// Count records per key into a new table.
    pub fn count_by_key(&self, store_name: impl Into<String>) -> TopologyResult<KTable> {
        self.aggregate_by_key(
            || StreamValue::Integer(0),
            |_key, _value, agg| StreamValue::Integer(agg.as_integer().unwrap_or(0) + 1),
            store_name,
        )
    }

    /// Windowed variant of `aggregate_by_key`: each (key, window) pair keeps
    /// its own running value, and the table's effective key becomes
    /// `[key, window-start]`.
    pub fn aggregate_by_key_windowed(
        &self,
        initializer: impl Fn() -> StreamValue + Send + Sync + 'static,
        aggregator: impl Fn(&StreamValue, &StreamValue, &StreamValue) -> StreamValue
            + Send
            + Sync
            + 'static,
        windows: Windows,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let store_name = store_name.into();
        let grouped = self.repartition_if_needed(&store_name)?;
        let mut inner = grouped.inner.borrow_mut();
        inner.register_store(
            StateStoreConfig::new(store_name.clone()),
            "aggregate_by_key_windowed",
        )?;
        let name = inner.new_name("KSTREAM-WINDOWED-AGGREGATE");
        let node = inner.add_processor(
            name,
            ProcessorLogic::WindowedAggregate {
                store: store_name.clone(),
                windows,
                initializer: Arc::new(initializer),
                aggregator: Arc::new(aggregator),
            },
            vec![grouped.node],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }

    /// Windowed variant of `reduce_by_key`.
    pub fn reduce_by_key_windowed(
        &self,
        reducer: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        windows: Windows,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let reducer = Arc::new(reducer);
        self.aggregate_by_key_windowed(
            || StreamValue::Null,
            move |_key, value, agg| {
                if agg.is_null() {
                    value.clone()
                } else {
                    reducer(agg, value)
                }
            },
            windows,
            store_name,
        )
    }

    /// Windowed variant of `count_by_key`.
    pub fn count_by_key_windowed(
        &self,
        windows: Windows,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        self.aggregate_by_key_windowed(
            || StreamValue::Integer(0),
            |_key, _value, agg| StreamValue::Integer(agg.as_integer().unwrap_or(0) + 1),
            windows,
            store_name,
        )
    }

    // ---- joins ----

    fn stream_join(
        &self,
        other: &KStream,
        kind: JoinKind,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        windows: Windows,
    ) -> TopologyResult<KStream> {
        self.ensure_same_builder(&other.inner, "join_windowed")?;

        let join_hint = self.inner.borrow_mut().new_name("KSTREAM-JOIN");
        let left = self.repartition_if_needed(&format!("{}-left", join_hint))?;
        let right = other.repartition_if_needed(&format!("{}-right", join_hint))?;

        let mut inner = self.inner.borrow_mut();
        let left_store = format!("{}-this", join_hint);
        let right_store = format!("{}-other", join_hint);
        inner.register_store(StateStoreConfig::new(left_store.clone()), "join_windowed")?;
        inner.register_store(StateStoreConfig::new(right_store.clone()), "join_windowed")?;
        let node = inner.add_processor(
            join_hint,
            ProcessorLogic::StreamJoin {
                kind,
                windows,
                joiner: Arc::new(joiner),
                left_store,
                right_store,
            },
            vec![left.node, right.node],
        );
        drop(inner);
        Ok(KStream::new(self.inner.clone(), node))
    }

    /// Windowed inner join: for each record on either side, emit one joined
    /// output per matching-key record on the other side whose timestamp lies
    /// within the window. No match within the window, no output.
    pub fn join_windowed(
        &self,
        other: &KStream,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        windows: Windows,
    ) -> TopologyResult<KStream> {
        self.stream_join(other, JoinKind::Inner, joiner, windows)
    }

    /// Windowed left join: like `join_windowed`, but an unmatched left-side
    /// record emits once with `Null` for the right-hand value.
    pub fn left_join_windowed(
        &self,
        other: &KStream,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        windows: Windows,
    ) -> TopologyResult<KStream> {
        self.stream_join(other, JoinKind::Left, joiner, windows)
    }

    /// Windowed outer join: every record on either side emits, pairing with
    /// `Null` when the other side has no match in the window.
    pub fn outer_join_windowed(
        &self,
        other: &KStream,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        windows: Windows,
    ) -> TopologyResult<KStream> {
        self.stream_join(other, JoinKind::Outer, joiner, windows)
    }

    /// Stream-table left join: for each stream record, look up the table's
    /// *current* value for the key (as of now, no windowing) and emit the
    /// joined record; a missing key joins against `Null`.
    pub fn left_join(
        &self,
        table: &KTable,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
    ) -> TopologyResult<KStream> {
        self.ensure_same_builder(table.builder(), "left_join")?;
        let stream = self.repartition_if_needed(table.store_name())?;
        let mut inner = stream.inner.borrow_mut();
        let name = inner.new_name("KSTREAM-LEFTJOIN");
        let node = inner.add_processor(
            name,
            ProcessorLogic::StreamTableJoin {
                joiner: Arc::new(joiner),
                table_store: table.store_name().to_string(),
            },
            vec![stream.node, table.node()],
        );
        drop(inner);
        Ok(KStream::new(self.inner.clone(), node))
    }
}
