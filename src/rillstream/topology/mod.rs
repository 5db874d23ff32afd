//! # Topology construction
//!
//! The [`TopologyBuilder`] is the process-wide mutable graph every DSL call
//! registers into: source nodes bound to topics, processor nodes bound to
//! transformation logic, sink nodes bound to output topics, and state-store
//! declarations. [`TopologyBuilder::build`] freezes the accumulated graph
//! into an immutable [`Topology`] for the external runtime.
//!
//! ## Invariants
//!
//! - Every node id is unique within a builder instance.
//! - Processor and sink nodes reference only already-registered parents, so
//!   the graph is a DAG by construction; cycles are not constructible.
//! - Configuration problems (missing codecs, duplicate store names) are
//!   rejected at registration time with a descriptive [`TopologyError`].
//!
//! ## Example
//!
//! ```rust
//! use rillstream::rillstream::topology::TopologyBuilder;
//! use rillstream::rillstream::topic::TopicConfig;
//! use rillstream::rillstream::serialization::{JsonCodec, StringCodec};
//! use rillstream::rillstream::types::StreamValue;
//!
//! let builder = TopologyBuilder::new("orders-app")
//!     .default_key_codec(StringCodec)
//!     .default_value_codec(JsonCodec::new());
//!
//! let orders = builder.stream(TopicConfig::new("orders"))?;
//! orders
//!     .filter(|_, v| !v.is_null())
//!     .to(TopicConfig::new("orders-clean"))?;
//!
//! let topology = builder.build()?;
//! assert_eq!(topology.source_topics().len(), 1);
//! # Ok::<(), rillstream::rillstream::error::TopologyError>(())
//! ```

pub mod namer;
pub mod node;

pub use namer::NodeNamer;
pub use node::{
    Aggregator, ForEachAction, Initializer, JoinKind, KeyMapper, KeyValueFlatMapper,
    KeyValueMapper, Node, NodeId, NodeKind, Predicate, ProcessorFn, ProcessorLogic, Reducer,
    TableJoinKind, TransformerFn, ValueFlatMapper, ValueJoiner, ValueMapper, ValueTransformerFn,
};

use crate::rillstream::error::{TopologyError, TopologyResult};
use crate::rillstream::serialization::{Codec, CodecRef};
use crate::rillstream::state::StateStoreConfig;
use crate::rillstream::stream::KStream;
use crate::rillstream::table::KTable;
use crate::rillstream::topic::TopicConfig;
use log::debug;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Mutable graph state shared by the builder and every handle derived from it.
pub(crate) struct BuilderInner {
    application_id: String,
    nodes: Vec<Node>,
    stores: HashMap<String, StateStoreConfig>,
    store_order: Vec<String>,
    namer: NodeNamer,
    default_key_codec: Option<CodecRef>,
    default_value_codec: Option<CodecRef>,
}

impl BuilderInner {
    pub(crate) fn application_id(&self) -> &str {
        &self.application_id
    }

    pub(crate) fn new_name(&mut self, prefix: &str) -> String {
        self.namer.new_name(prefix)
    }

    /// Resolve a topic config against builder defaults, rejecting configs
    /// that still lack a codec. Validation is eager: the error surfaces at
    /// the registering call, not at build time.
    pub(crate) fn resolve_topic_config(
        &self,
        config: TopicConfig,
        operator: &str,
    ) -> TopologyResult<TopicConfig> {
        if config.topics().is_empty() {
            return Err(TopologyError::EmptyTopics {
                operator: operator.to_string(),
            });
        }
        let config = config.with_codec_defaults(
            self.default_key_codec.as_ref(),
            self.default_value_codec.as_ref(),
        );
        if config.key_codec_ref().is_none() {
            return Err(TopologyError::MissingCodec {
                operator: operator.to_string(),
                role: "key",
                topics: config.topics().to_vec(),
            });
        }
        if config.value_codec_ref().is_none() {
            return Err(TopologyError::MissingCodec {
                operator: operator.to_string(),
                role: "value",
                topics: config.topics().to_vec(),
            });
        }
        Ok(config)
    }

    pub(crate) fn add_source(&mut self, name: String, config: TopicConfig) -> NodeId {
        let id = NodeId(self.nodes.len());
        debug!("registering source {} ({}) <- {:?}", id, name, config.topics());
        self.nodes.push(Node {
            name,
            kind: NodeKind::Source {
                topics: config.topics().to_vec(),
                config,
            },
        });
        id
    }

    pub(crate) fn add_processor(
        &mut self,
        name: String,
        logic: ProcessorLogic,
        inputs: Vec<NodeId>,
    ) -> NodeId {
        debug_assert!(inputs.iter().all(|p| p.0 < self.nodes.len()));
        let id = NodeId(self.nodes.len());
        debug!(
            "registering processor {} ({}) <- {:?}",
            id,
            logic.kind_name(),
            inputs
        );
        self.nodes.push(Node {
            name,
            kind: NodeKind::Processor { logic, inputs },
        });
        id
    }

    pub(crate) fn add_sink(
        &mut self,
        name: String,
        topic: String,
        config: TopicConfig,
        input: NodeId,
    ) -> NodeId {
        debug_assert!(input.0 < self.nodes.len());
        let id = NodeId(self.nodes.len());
        debug!("registering sink {} ({}) -> {}", id, name, topic);
        self.nodes.push(Node {
            name,
            kind: NodeKind::Sink {
                topic,
                config,
                inputs: vec![input],
            },
        });
        id
    }

    /// Register a state store declaration exactly once.
    pub(crate) fn register_store(
        &mut self,
        config: StateStoreConfig,
        operator: &str,
    ) -> TopologyResult<()> {
        let config = config.with_codec_defaults(
            self.default_key_codec.as_ref(),
            self.default_value_codec.as_ref(),
        );
        let name = config.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(TopologyError::DuplicateStateStore {
                store_name: name,
                operator: operator.to_string(),
            });
        }
        debug!("registering state store '{}' via {}", name, operator);
        self.store_order.push(name.clone());
        self.stores.insert(name, config);
        Ok(())
    }

    fn source_topics(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Source { topics, .. } => Some(topics.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Accumulates a processing graph through DSL calls and compiles it.
///
/// Created once per application; every stream/table handle derived from it
/// shares the same underlying graph. Construction is single-threaded and
/// performs no I/O.
pub struct TopologyBuilder {
    inner: Rc<RefCell<BuilderInner>>,
}

impl TopologyBuilder {
    /// New builder for the given application id. The id scopes internal
    /// topic names (repartition topics) and consumer-group subscriptions.
    pub fn new(application_id: impl Into<String>) -> Self {
        TopologyBuilder {
            inner: Rc::new(RefCell::new(BuilderInner {
                application_id: application_id.into(),
                nodes: Vec::new(),
                stores: HashMap::new(),
                store_order: Vec::new(),
                namer: NodeNamer::new(),
                default_key_codec: None,
                default_value_codec: None,
            })),
        }
    }

    /// Default key codec for configs that leave it unset.
    pub fn default_key_codec(self, codec: impl Codec + 'static) -> Self {
        self.inner.borrow_mut().default_key_codec = Some(std::sync::Arc::new(codec));
        self
    }

    /// Default value codec for configs that leave it unset.
    pub fn default_value_codec(self, codec: impl Codec + 'static) -> Self {
        self.inner.borrow_mut().default_value_codec = Some(std::sync::Arc::new(codec));
        self
    }

    /// The application id this builder was created with.
    pub fn application_id(&self) -> String {
        self.inner.borrow().application_id.clone()
    }

    /// Registers a source node over the config's topic(s) — one fan-in
    /// source when the config names several — and returns a stream over it.
    pub fn stream(&self, config: TopicConfig) -> TopologyResult<KStream> {
        let mut inner = self.inner.borrow_mut();
        let config = inner.resolve_topic_config(config, "stream")?;
        let name = inner.new_name("KSTREAM-SOURCE");
        let node = inner.add_source(name, config);
        drop(inner);
        Ok(KStream::new(self.inner.clone(), node))
    }

    /// Registers one source node per config and merges them into one stream.
    pub fn streams<I>(&self, configs: I) -> TopologyResult<KStream>
    where
        I: IntoIterator<Item = TopicConfig>,
    {
        let mut handles = Vec::new();
        for config in configs {
            handles.push(self.stream(config)?);
        }
        if handles.is_empty() {
            return Err(TopologyError::InvalidOperator {
                operator: "streams".to_string(),
                reason: "at least one topic configuration is required".to_string(),
            });
        }
        if handles.len() == 1 {
            return Ok(handles.into_iter().next().unwrap());
        }
        self.merge(&handles)
    }

    /// Registers a source node plus an implicit state store materializing
    /// the topic's changelog, and returns a table over it.
    pub fn table(
        &self,
        config: TopicConfig,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let store_name = store_name.into();
        let mut inner = self.inner.borrow_mut();
        let config = inner.resolve_topic_config(config, "table")?;
        let store = StateStoreConfig::new(store_name.clone());
        inner.register_store(store, "table")?;
        let source_name = inner.new_name("KTABLE-SOURCE");
        let source = inner.add_source(source_name, config);
        let table_name = inner.new_name("KTABLE");
        let node = inner.add_processor(
            table_name,
            ProcessorLogic::TableSource {
                store: store_name.clone(),
            },
            vec![source],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }

    /// Registers a node interleaving all given streams. Each input keeps its
    /// own relative order; no ordering is guaranteed across inputs.
    pub fn merge(&self, streams: &[KStream]) -> TopologyResult<KStream> {
        if streams.is_empty() {
            return Err(TopologyError::InvalidOperator {
                operator: "merge".to_string(),
                reason: "at least one input stream is required".to_string(),
            });
        }
        for s in streams {
            if !Rc::ptr_eq(&self.inner, s.builder()) {
                return Err(TopologyError::ForeignHandle {
                    operator: "merge".to_string(),
                });
            }
        }
        let inputs: Vec<NodeId> = streams.iter().map(|s| s.node()).collect();
        let repartition = streams.iter().any(|s| s.repartition_required());
        let mut inner = self.inner.borrow_mut();
        let name = inner.new_name("KSTREAM-MERGE");
        let node = inner.add_processor(name, ProcessorLogic::Merge, inputs);
        drop(inner);
        Ok(KStream::new_with_repartition(
            self.inner.clone(),
            node,
            repartition,
        ))
    }

    /// Declares a state store explicitly, for `process`/`transform` logic.
    pub fn add_state_store(&self, config: StateStoreConfig) -> TopologyResult<()> {
        self.inner
            .borrow_mut()
            .register_store(config, "add_state_store")
    }

    /// Every topic consumed as a source by this builder, including internal
    /// re-read topics created by `through` and repartitioning. The runtime
    /// derives its consumer subscriptions from this set.
    pub fn source_topics(&self) -> BTreeSet<String> {
        self.inner.borrow().source_topics()
    }

    /// Freezes the accumulated graph into an immutable, executable topology.
    ///
    /// The builder must not be mutated afterwards; any store referenced by
    /// `process`/`transform` logic must have been declared.
    pub fn build(&self) -> TopologyResult<Topology> {
        let inner = self.inner.borrow();
        // Custom-logic store references cannot be checked at registration
        // time because add_state_store may legitimately come later.
        for node in &inner.nodes {
            if let NodeKind::Processor { logic, .. } = &node.kind {
                let referenced: &[String] = match logic {
                    ProcessorLogic::Process { stores, .. } => stores,
                    ProcessorLogic::Transform { stores, .. } => stores,
                    ProcessorLogic::TransformValues { stores, .. } => stores,
                    _ => &[],
                };
                for store in referenced {
                    if !inner.stores.contains_key(store) {
                        return Err(TopologyError::UnknownStateStore {
                            store_name: store.clone(),
                            operator: node.name.clone(),
                        });
                    }
                }
            }
        }

        let nodes = inner.nodes.clone();
        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];
        for (idx, node) in nodes.iter().enumerate() {
            for parent in node.inputs() {
                children[parent.0].push(NodeId(idx));
            }
        }
        let stores = inner
            .store_order
            .iter()
            .map(|name| inner.stores[name].clone())
            .collect();
        Ok(Topology {
            application_id: inner.application_id.clone(),
            source_topics: inner.source_topics(),
            nodes,
            children,
            stores,
        })
    }
}

/// The compiled, immutable processing graph handed to the runtime.
///
/// The core never inspects runtime execution state; this object is the whole
/// contract between construction and execution.
#[derive(Debug)]
pub struct Topology {
    application_id: String,
    nodes: Vec<Node>,
    children: Vec<Vec<NodeId>>,
    stores: Vec<StateStoreConfig>,
    source_topics: BTreeSet<String>,
}

impl Topology {
    /// Application id the topology was built for.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node lookup by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Children (downstream consumers) of a node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.0]
    }

    /// Ids of all source nodes.
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Source { .. }))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Ids of all sink nodes.
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Sink { .. }))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Declared state stores in registration order.
    pub fn stores(&self) -> &[StateStoreConfig] {
        &self.stores
    }

    /// Every topic consumed by a source node.
    pub fn source_topics(&self) -> &BTreeSet<String> {
        &self.source_topics
    }

    /// Human-readable topology listing, one line per node.
    pub fn describe(&self) -> String {
        let mut out = format!("Topology: {}\n", self.application_id);
        for (idx, node) in self.nodes.iter().enumerate() {
            let id = NodeId(idx);
            match &node.kind {
                NodeKind::Source { topics, .. } => {
                    out.push_str(&format!("  {} source {} topics={:?}\n", id, node.name, topics));
                }
                NodeKind::Processor { logic, inputs } => {
                    out.push_str(&format!(
                        "  {} processor {} [{}] <- {:?}\n",
                        id,
                        node.name,
                        logic.kind_name(),
                        inputs
                    ));
                }
                NodeKind::Sink { topic, inputs, .. } => {
                    out.push_str(&format!(
                        "  {} sink {} topic={} <- {:?}\n",
                        id, node.name, topic, inputs
                    ));
                }
            }
        }
        if !self.stores.is_empty() {
            out.push_str("  stores:\n");
            for store in &self.stores {
                out.push_str(&format!("    {}\n", store.name()));
            }
        }
        out
    }
}
