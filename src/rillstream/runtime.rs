//! Interface to the external execution runtime.
//!
//! The topology core never schedules tasks, persists stores, or talks to
//! brokers; it hands the compiled [`Topology`] to a runtime implementing
//! [`StreamRuntime`] and forwards lifecycle calls unchanged.

use crate::rillstream::error::TopologyResult;
use crate::rillstream::topology::Topology;
use log::info;
use std::collections::HashMap;

/// The contract the core needs from an execution runtime: begin and cease
/// processing a compiled topology under a property map of runtime
/// configuration. Delivery guarantees, partition assignment, and state
/// persistence are entirely the runtime's concern.
pub trait StreamRuntime {
    /// Begin processing the topology.
    fn start(
        &mut self,
        topology: &Topology,
        properties: &HashMap<String, String>,
    ) -> TopologyResult<()>;

    /// Cease processing.
    fn close(&mut self) -> TopologyResult<()>;
}

/// A compiled topology paired with a runtime and its configuration.
///
/// `start` and `close` are direct pass-throughs.
pub struct StreamsApplication<R: StreamRuntime> {
    topology: Topology,
    properties: HashMap<String, String>,
    runtime: R,
}

impl<R: StreamRuntime> StreamsApplication<R> {
    /// Pair a compiled topology with a runtime and property map.
    pub fn new(topology: Topology, properties: HashMap<String, String>, runtime: R) -> Self {
        StreamsApplication {
            topology,
            properties,
            runtime,
        }
    }

    /// Begin processing.
    pub fn start(&mut self) -> TopologyResult<()> {
        info!(
            "starting streams application '{}'",
            self.topology.application_id()
        );
        self.runtime.start(&self.topology, &self.properties)
    }

    /// Cease processing.
    pub fn close(&mut self) -> TopologyResult<()> {
        info!(
            "closing streams application '{}'",
            self.topology.application_id()
        );
        self.runtime.close()
    }

    /// The compiled topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}
