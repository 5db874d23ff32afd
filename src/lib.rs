//! # rillstream
//!
//! A declarative stream-processing DSL for Rust: describe a data-flow graph
//! over keyed, partitioned record streams (filter, map, join, window,
//! aggregate) and compile it into a processor topology for an execution
//! runtime to schedule.
//!
//! ## Features
//!
//! - **Fluent graph building**: every transformation returns a new handle
//!   bound to a newly registered node; handles are reusable for fan-out
//! - **Streams and tables**: record streams and changelog tables ("latest
//!   value per key") with conversions in both directions
//! - **Stateful operators**: windowed stream-stream joins, stream-table
//!   lookups, incremental aggregation with changelog-aware subtraction
//! - **Deterministic naming**: repeated operators never collide; topologies
//!   are reproducible node for node
//! - **In-memory test driver**: execute a topology synchronously in tests,
//!   no broker required
//!
//! ## Quick Start
//!
//! ```rust
//! use rillstream::{TopologyBuilder, TopicConfig, JsonCodec, StringCodec, StreamValue};
//!
//! fn main() -> Result<(), rillstream::TopologyError> {
//!     let builder = TopologyBuilder::new("word-count")
//!         .default_key_codec(StringCodec)
//!         .default_value_codec(JsonCodec::new());
//!
//!     let lines = builder.stream(TopicConfig::new("lines"))?;
//!     let counts = lines
//!         .flat_map(|_key, value| {
//!             value
//!                 .as_str()
//!                 .map(|text| {
//!                     text.split_whitespace()
//!                         .map(|w| (StreamValue::from(w), StreamValue::from(w)))
//!                         .collect()
//!                 })
//!                 .unwrap_or_default()
//!         })
//!         .count_by_key("word-counts")?;
//!     counts.to_kstream(None).to(TopicConfig::new("counts"))?;
//!
//!     let topology = builder.build()?;
//!     assert!(topology.source_topics().contains("lines"));
//!     Ok(())
//! }
//! ```

pub mod rillstream;

// Re-export the main API at crate root for easy access
pub use rillstream::error::{TopologyError, TopologyResult};
pub use rillstream::runtime::{StreamRuntime, StreamsApplication};
pub use rillstream::serialization::{
    BytesCodec, Codec, CodecRef, JsonCodec, SerializationError, StringCodec,
};
pub use rillstream::state::{KeyValueStore, ProcessorContext, StateStoreConfig};
pub use rillstream::stream::KStream;
pub use rillstream::table::{ChangeEvent, KGroupedTable, KTable};
pub use rillstream::test_harness::TopologyTestDriver;
pub use rillstream::topic::TopicConfig;
pub use rillstream::topology::{NodeId, Topology, TopologyBuilder};
pub use rillstream::types::{Record, StreamValue};
pub use rillstream::window::Windows;
