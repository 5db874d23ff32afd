//! Topology construction error types with proper context preservation.
//!
//! All construction failures name the offending node or operator so a
//! misconfigured DSL call can be traced back to its call site. A failed
//! registration leaves the builder valid but incomplete; it must not be
//! compiled and executed after an ignored failure.

use crate::rillstream::serialization::SerializationError;

/// Main error type for topology construction.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// A source or sink could not resolve a key or value codec
    #[error("Missing {role} codec for {operator} on topic(s) {topics:?} and no builder default is set")]
    MissingCodec {
        operator: String,
        role: &'static str,
        topics: Vec<String>,
    },

    /// A topic configuration carried no topic names
    #[error("Operator '{operator}' was given a topic configuration with no topics")]
    EmptyTopics { operator: String },

    /// A state store name was registered twice in one builder
    #[error("State store '{store_name}' is already registered (second registration by '{operator}')")]
    DuplicateStateStore {
        store_name: String,
        operator: String,
    },

    /// A handle referenced a different builder instance
    #[error("Operator '{operator}' combines handles from different builders")]
    ForeignHandle { operator: String },

    /// An operator was invoked with arguments that cannot form a valid node
    #[error("Invalid operator '{operator}': {reason}")]
    InvalidOperator { operator: String, reason: String },

    /// A referenced state store was never declared to the builder
    #[error("Operator '{operator}' references undeclared state store '{store_name}'")]
    UnknownStateStore {
        store_name: String,
        operator: String,
    },

    /// Serialization failure surfaced during construction-time validation
    #[error("Serialization failure in '{operator}'")]
    Serialization {
        operator: String,
        #[source]
        source: SerializationError,
    },
}

/// Result alias for topology construction operations.
pub type TopologyResult<T> = Result<T, TopologyError>;
