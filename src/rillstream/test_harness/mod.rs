//! In-memory test tooling for compiled topologies.
//!
//! [`TopologyTestDriver`] executes a topology synchronously without any
//! broker or runtime: pipe records into source topics, read captured sink
//! output, inspect state stores. Operator semantics (windowed joins,
//! changelog re-aggregation) behave as the runtime contract specifies, so
//! DSL-level tests need no external infrastructure.

pub mod driver;
pub mod join_buffer;

pub use driver::TopologyTestDriver;
pub use join_buffer::JoinBuffer;
