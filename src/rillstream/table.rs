//! The changelog-table abstraction and its operators.
//!
//! A [`KTable`] represents a keyed, continuously updated view (latest value
//! per key) backed by a named state store. Tables convert to streams via
//! [`KTable::to_kstream`] and streams aggregate into tables; those are the
//! only two directions of conversion. A [`KGroupedTable`] is the in-flight
//! result of re-keying a table, consumed by exactly one aggregation that
//! yields the new table.
//!
//! Because the upstream of a grouped aggregation is a *changelog*, not an
//! append-only log, every update is first un-done on its old grouping key
//! and re-done on its new one; that is why [`KGroupedTable::aggregate`]
//! takes a subtractor alongside the adder.

use crate::rillstream::error::TopologyResult;
use crate::rillstream::state::StateStoreConfig;
use crate::rillstream::stream::KStream;
use crate::rillstream::topology::node::{NodeId, ProcessorLogic, TableJoinKind};
use crate::rillstream::topology::BuilderInner;
use crate::rillstream::types::StreamValue;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// One update event in a table's changelog: the key, the superseded value
/// (if any) and the new value (`None` for a deletion).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: StreamValue,
    pub old_value: Option<StreamValue>,
    pub new_value: Option<StreamValue>,
    pub timestamp: i64,
}

/// A handle to a keyed latest-value view at one point of the topology graph.
#[derive(Clone)]
pub struct KTable {
    inner: Rc<RefCell<BuilderInner>>,
    node: NodeId,
    store_name: String,
}

impl fmt::Debug for KTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KTable")
            .field("node", &self.node)
            .field("store_name", &self.store_name)
            .finish()
    }
}

impl KTable {
    pub(crate) fn new(
        inner: Rc<RefCell<BuilderInner>>,
        node: NodeId,
        store_name: String,
    ) -> Self {
        KTable {
            inner,
            node,
            store_name,
        }
    }

    pub(crate) fn builder(&self) -> &Rc<RefCell<BuilderInner>> {
        &self.inner
    }

    /// Id of the node whose changelog this handle denotes.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Name of the state store backing this table.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    fn table_join(
        &self,
        other: &KTable,
        kind: TableJoinKind,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        store_name: String,
    ) -> TopologyResult<KTable> {
        let mut inner = self.inner.borrow_mut();
        inner.register_store(StateStoreConfig::new(store_name.clone()), "table join")?;
        let name = inner.new_name("KTABLE-JOIN");
        let node = inner.add_processor(
            name,
            ProcessorLogic::TableJoin {
                kind,
                joiner: Arc::new(joiner),
                left_store: self.store_name.clone(),
                right_store: other.store_name.clone(),
                store: store_name.clone(),
            },
            vec![self.node, other.node],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }

    /// Table-table inner join: on every update to either side, recompute the
    /// joined value from both tables' current values. Output is suppressed
    /// while either side's key is absent.
    pub fn join(
        &self,
        other: &KTable,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        self.table_join(other, TableJoinKind::Inner, joiner, store_name.into())
    }

    /// Table-table outer join: absent sides join as `Null` instead of
    /// suppressing the output.
    pub fn outer_join(
        &self,
        other: &KTable,
        joiner: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        self.table_join(other, TableJoinKind::Outer, joiner, store_name.into())
    }

    /// Re-key the changelog for a subsequent aggregation. Always triggers a
    /// repartition on the regrouped key.
    pub fn group_by(
        &self,
        mapper: impl Fn(&StreamValue, &StreamValue) -> (StreamValue, StreamValue)
            + Send
            + Sync
            + 'static,
    ) -> KGroupedTable {
        let mut inner = self.inner.borrow_mut();
        let name = inner.new_name("KTABLE-GROUPBY");
        let node = inner.add_processor(
            name,
            ProcessorLogic::TableGroupBy {
                mapper: Arc::new(mapper),
            },
            vec![self.node],
        );
        drop(inner);
        KGroupedTable {
            inner: self.inner.clone(),
            node,
        }
    }

    /// Materialize the table's changelog (every update event) as a record
    /// stream, optionally remapping keys during the conversion.
    pub fn to_kstream(
        &self,
        key_mapper: Option<
            Arc<dyn Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync>,
        >,
    ) -> KStream {
        let mut inner = self.inner.borrow_mut();
        let name = inner.new_name("KTABLE-TOSTREAM");
        let rekeyed = key_mapper.is_some();
        let node = inner.add_processor(
            name,
            ProcessorLogic::TableToStream { key_mapper },
            vec![self.node],
        );
        drop(inner);
        // Remapped keys put the stream back in need of repartitioning.
        KStream::new_with_repartition(self.inner.clone(), node, rekeyed)
    }
}

/// Intermediate handle produced by [`KTable::group_by`]; consumed by exactly
/// one of [`aggregate`](KGroupedTable::aggregate), [`count`](KGroupedTable::count)
/// or [`reduce`](KGroupedTable::reduce). Has no state store of its own.
pub struct KGroupedTable {
    inner: Rc<RefCell<BuilderInner>>,
    node: NodeId,
}

impl KGroupedTable {
    /// Maintain a running value per grouped key. The adder folds in a newly
    /// arrived value; the subtractor removes the effect of a value being
    /// superseded or deleted on its old key.
    pub fn aggregate(
        self,
        initializer: impl Fn() -> StreamValue + Send + Sync + 'static,
        adder: impl Fn(&StreamValue, &StreamValue, &StreamValue) -> StreamValue
            + Send
            + Sync
            + 'static,
        subtractor: impl Fn(&StreamValue, &StreamValue, &StreamValue) -> StreamValue
            + Send
            + Sync
            + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let store_name = store_name.into();
        let mut inner = self.inner.borrow_mut();
        inner.register_store(StateStoreConfig::new(store_name.clone()), "aggregate")?;
        let name = inner.new_name("KTABLE-AGGREGATE");
        let node = inner.add_processor(
            name,
            ProcessorLogic::TableAggregate {
                store: store_name.clone(),
                initializer: Arc::new(initializer),
                adder: Arc::new(adder),
                subtractor: Arc::new(subtractor),
            },
            vec![self.node],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }

    /// Count rows per grouped key; inverse bookkeeping (decrement on the old
    /// key) is derived internally.
    pub fn count(self, store_name: impl Into<String>) -> TopologyResult<KTable> {
        self.aggregate(
            || StreamValue::Integer(0),
            |_key, _value, agg| StreamValue::Integer(agg.as_integer().unwrap_or(0) + 1),
            |_key, _value, agg| StreamValue::Integer(agg.as_integer().unwrap_or(0) - 1),
            store_name,
        )
    }

    /// Associatively combine values per grouped key. The caller supplies no
    /// subtraction logic; the implementation keeps a per-key bag of
    /// contributing values and refolds it when a value is removed from the
    /// group.
    pub fn reduce(
        self,
        reducer: impl Fn(&StreamValue, &StreamValue) -> StreamValue + Send + Sync + 'static,
        store_name: impl Into<String>,
    ) -> TopologyResult<KTable> {
        let store_name = store_name.into();
        let mut inner = self.inner.borrow_mut();
        inner.register_store(StateStoreConfig::new(store_name.clone()), "reduce")?;
        let name = inner.new_name("KTABLE-REDUCE");
        let node = inner.add_processor(
            name,
            ProcessorLogic::TableReduce {
                store: store_name.clone(),
                reducer: Arc::new(reducer),
            },
            vec![self.node],
        );
        drop(inner);
        Ok(KTable::new(self.inner.clone(), node, store_name))
    }
}
