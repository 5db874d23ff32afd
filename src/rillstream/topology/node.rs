//! Node arena records and the closed set of processor logic descriptors.
//!
//! The graph is an arena of [`Node`]s indexed by [`NodeId`], with explicit
//! parent-id lists instead of pointer-linked objects. Operator logic is a
//! closed enum of operation kinds ([`ProcessorLogic`]), each variant carrying
//! the strongly typed callable appropriate to its role; execution dispatches
//! by variant tag.

use crate::rillstream::state::ProcessorContext;
use crate::rillstream::topic::TopicConfig;
use crate::rillstream::types::StreamValue;
use crate::rillstream::window::Windows;
use std::fmt;
use std::sync::Arc;

/// Index of a node in the builder's arena. Only the builder mints ids, so
/// every `NodeId` handed out is a valid index into the topology it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Record predicate over (key, value).
pub type Predicate = Arc<dyn Fn(&StreamValue, &StreamValue) -> bool + Send + Sync>;
/// Maps (key, value) to a new (key, value).
pub type KeyValueMapper = Arc<dyn Fn(&StreamValue, &StreamValue) -> (StreamValue, StreamValue) + Send + Sync>;
/// Maps (key, value) to zero or more (key, value) pairs.
pub type KeyValueFlatMapper =
    Arc<dyn Fn(&StreamValue, &StreamValue) -> Vec<(StreamValue, StreamValue)> + Send + Sync>;
/// Maps a value to a new value, key untouched.
pub type ValueMapper = Arc<dyn Fn(&StreamValue) -> StreamValue + Send + Sync>;
/// Maps a value to zero or more values, key untouched.
pub type ValueFlatMapper = Arc<dyn Fn(&StreamValue) -> Vec<StreamValue> + Send + Sync>;
/// Computes a new key from (key, value).
pub type KeyMapper = Arc<dyn Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync>;
/// Combines a left and right value into a joined value; an absent side
/// arrives as `StreamValue::Null`.
pub type ValueJoiner = Arc<dyn Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync>;
/// Produces the initial aggregate for a key not seen before.
pub type Initializer = Arc<dyn Fn() -> StreamValue + Send + Sync>;
/// Folds (key, value, aggregate) into the next aggregate.
pub type Aggregator =
    Arc<dyn Fn(&StreamValue, &StreamValue, &StreamValue) -> StreamValue + Send + Sync>;
/// Associative combiner (aggregate, value) -> aggregate.
pub type Reducer = Arc<dyn Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync>;
/// Side-effecting per-record action.
pub type ForEachAction = Arc<dyn Fn(&StreamValue, &StreamValue) + Send + Sync>;
/// Arbitrary stateful per-record logic with store access, no downstream output.
pub type ProcessorFn =
    Arc<dyn Fn(&mut ProcessorContext, &StreamValue, &StreamValue) + Send + Sync>;
/// Arbitrary stateful per-record logic producing downstream records.
pub type TransformerFn = Arc<
    dyn Fn(&mut ProcessorContext, &StreamValue, &StreamValue) -> Vec<(StreamValue, StreamValue)>
        + Send
        + Sync,
>;
/// Stateful value transformation, key untouched.
pub type ValueTransformerFn =
    Arc<dyn Fn(&mut ProcessorContext, &StreamValue, &StreamValue) -> StreamValue + Send + Sync>;

/// Join flavor for windowed stream-stream joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Emit only when both sides match within the window
    Inner,
    /// Left side always emits; right side pairs with `Null` when absent
    Left,
    /// Both sides always emit; the absent side is `Null`
    Outer,
}

/// Join flavor for table-table joins (no windowing; tables are "as of now").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableJoinKind {
    /// Output suppressed while either side's key is absent
    Inner,
    /// Output propagates with `Null` for an absent side
    Outer,
}

/// The closed set of operation kinds a processor node can carry.
///
/// Stateless variants are pure record functions; stateful variants name the
/// state store(s) they read and write. Table-valued variants (everything from
/// `TableSource` down) consume and emit changelog updates rather than plain
/// records.
#[derive(Clone)]
pub enum ProcessorLogic {
    /// Pass records satisfying (or, negated, violating) the predicate
    Filter { predicate: Predicate, negate: bool },
    /// One-to-one rekeying map over (key, value)
    Map { mapper: KeyValueMapper },
    /// One-to-one value map, key and partitioning preserved
    MapValues { mapper: ValueMapper },
    /// Zero-to-many map over (key, value)
    FlatMap { mapper: KeyValueFlatMapper },
    /// Zero-to-many value map, key preserved
    FlatMapValues { mapper: ValueFlatMapper },
    /// Recompute the key; downstream stateful operators must repartition
    SelectKey { mapper: KeyMapper },
    /// One arm of a branch: passes a record iff `index` is the first
    /// predicate in `predicates` that matches (first-match-wins)
    BranchArm {
        predicates: Arc<Vec<Predicate>>,
        index: usize,
    },
    /// Interleaves all parents, preserving each parent's relative order
    Merge,
    /// Terminal side effect per record
    ForEach { action: ForEachAction },
    /// Terminal stateful side logic with access to the named stores
    Process {
        processor: ProcessorFn,
        stores: Vec<String>,
    },
    /// Stateful record transformation with access to the named stores
    Transform {
        transformer: TransformerFn,
        stores: Vec<String>,
    },
    /// Stateful value transformation, key preserved
    TransformValues {
        transformer: ValueTransformerFn,
        stores: Vec<String>,
    },
    /// Fold all records per key into a running aggregate table
    Aggregate {
        store: String,
        initializer: Initializer,
        aggregator: Aggregator,
    },
    /// Per-(key, window) aggregate; the table key becomes [key, window-start]
    WindowedAggregate {
        store: String,
        windows: Windows,
        initializer: Initializer,
        aggregator: Aggregator,
    },
    /// Windowed stream-stream join; parents are [left, right]
    StreamJoin {
        kind: JoinKind,
        windows: Windows,
        joiner: ValueJoiner,
        left_store: String,
        right_store: String,
    },
    /// Stream-table left join; parents are [stream, table], lookups hit
    /// the table's store as of arrival time
    StreamTableJoin {
        joiner: ValueJoiner,
        table_store: String,
    },
    /// Materializes a source topic's changelog into a table store
    TableSource { store: String },
    /// Table-table join recomputed on every update to either side
    TableJoin {
        kind: TableJoinKind,
        joiner: ValueJoiner,
        left_store: String,
        right_store: String,
        store: String,
    },
    /// Re-keys a table's changelog ahead of a re-aggregation
    TableGroupBy { mapper: KeyValueMapper },
    /// Grouped-table aggregation with explicit add and subtract logic
    TableAggregate {
        store: String,
        initializer: Initializer,
        adder: Aggregator,
        subtractor: Aggregator,
    },
    /// Grouped-table reduce; inverse bookkeeping is kept internally as a
    /// per-key bag of contributing values, refolded on removal
    TableReduce { store: String, reducer: Reducer },
    /// Emits every table update as a stream record, optionally remapping keys
    TableToStream { key_mapper: Option<KeyMapper> },
}

impl ProcessorLogic {
    /// Short tag used in names, logs and topology descriptions.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProcessorLogic::Filter { negate: false, .. } => "FILTER",
            ProcessorLogic::Filter { negate: true, .. } => "FILTER-NOT",
            ProcessorLogic::Map { .. } => "MAP",
            ProcessorLogic::MapValues { .. } => "MAPVALUES",
            ProcessorLogic::FlatMap { .. } => "FLATMAP",
            ProcessorLogic::FlatMapValues { .. } => "FLATMAPVALUES",
            ProcessorLogic::SelectKey { .. } => "KEY-SELECT",
            ProcessorLogic::BranchArm { .. } => "BRANCH",
            ProcessorLogic::Merge => "MERGE",
            ProcessorLogic::ForEach { .. } => "FOREACH",
            ProcessorLogic::Process { .. } => "PROCESS",
            ProcessorLogic::Transform { .. } => "TRANSFORM",
            ProcessorLogic::TransformValues { .. } => "TRANSFORMVALUES",
            ProcessorLogic::Aggregate { .. } => "AGGREGATE",
            ProcessorLogic::WindowedAggregate { .. } => "WINDOWED-AGGREGATE",
            ProcessorLogic::StreamJoin { .. } => "JOIN",
            ProcessorLogic::StreamTableJoin { .. } => "LEFTJOIN",
            ProcessorLogic::TableSource { .. } => "TABLE-SOURCE",
            ProcessorLogic::TableJoin { .. } => "TABLE-JOIN",
            ProcessorLogic::TableGroupBy { .. } => "TABLE-GROUPBY",
            ProcessorLogic::TableAggregate { .. } => "TABLE-AGGREGATE",
            ProcessorLogic::TableReduce { .. } => "TABLE-REDUCE",
            ProcessorLogic::TableToStream { .. } => "TOSTREAM",
        }
    }

    /// Whether this logic emits changelog updates (table-valued output).
    pub fn is_table_valued(&self) -> bool {
        matches!(
            self,
            ProcessorLogic::Aggregate { .. }
                | ProcessorLogic::WindowedAggregate { .. }
                | ProcessorLogic::TableSource { .. }
                | ProcessorLogic::TableJoin { .. }
                | ProcessorLogic::TableAggregate { .. }
                | ProcessorLogic::TableReduce { .. }
        )
    }
}

impl fmt::Debug for ProcessorLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessorLogic::{}", self.kind_name())
    }
}

/// What a node is: where records enter, how they are transformed, or where
/// they leave.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Consumes one or more topics
    Source {
        topics: Vec<String>,
        config: TopicConfig,
    },
    /// Applies logic to the output of its parents
    Processor {
        logic: ProcessorLogic,
        inputs: Vec<NodeId>,
    },
    /// Writes its parent's output to a topic
    Sink {
        topic: String,
        config: TopicConfig,
        inputs: Vec<NodeId>,
    },
}

/// One entry in the builder's node arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Globally unique name within the builder
    pub name: String,
    /// Source / processor / sink payload
    pub kind: NodeKind,
}

impl Node {
    /// Parent ids; empty for sources.
    pub fn inputs(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Source { .. } => &[],
            NodeKind::Processor { inputs, .. } => inputs,
            NodeKind::Sink { inputs, .. } => inputs,
        }
    }
}
