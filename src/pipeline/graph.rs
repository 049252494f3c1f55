//! Pipeline container using daggy.

use super::events::{BusReceiver, BusSender, bus};
use crate::error::{Error, Result};
use crate::observability;
use crate::runtime::{NativeRuntime, Pad, UnitRef, UnitState};
use crate::stage::Stage;
use daggy::{Dag, NodeIndex, Walker};
use std::collections::HashMap;
use std::sync::Arc;

/// A link between two pads of registered units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Upstream pad.
    pub src: Pad,
    /// Downstream pad.
    pub sink: Pad,
}

/// Registered units, their pad links and the bus of one pipeline.
///
/// Units are kept in registration order; state changes walk them in
/// reverse so downstream units are ready before upstream ones push data,
/// and teardown releases them in reverse construction order.
pub struct Pipeline {
    name: String,
    runtime: Arc<dyn NativeRuntime>,
    graph: Dag<UnitRef, Link>,
    units_by_name: HashMap<String, NodeIndex>,
    stages: Vec<Box<dyn Stage>>,
    state: UnitState,
    torn_down: bool,
    bus_sender: Option<BusSender>,
    bus: Option<BusReceiver>,
}

impl Pipeline {
    /// Create an empty pipeline whose bus is attached to `runtime`.
    pub fn new(name: impl Into<String>, runtime: Arc<dyn NativeRuntime>) -> Self {
        let (bus_sender, bus_receiver) = bus();
        runtime.attach_bus(bus_sender.clone());
        Self {
            name: name.into(),
            runtime,
            graph: Dag::new(),
            units_by_name: HashMap::new(),
            stages: Vec::new(),
            state: UnitState::Null,
            torn_down: false,
            bus_sender: Some(bus_sender),
            bus: Some(bus_receiver),
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Whether no unit is registered.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of registered units.
    pub fn unit_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of pad links.
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Registered units in registration order.
    pub fn units(&self) -> impl Iterator<Item = &UnitRef> {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    /// Look up a registered unit.
    pub fn unit(&self, name: &str) -> Option<&UnitRef> {
        self.units_by_name
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Pad links in link order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.graph.raw_edges().iter().map(|edge| &edge.weight)
    }

    /// Units directly downstream of `name`.
    pub fn downstream(&self, name: &str) -> Vec<&UnitRef> {
        let Some(&idx) = self.units_by_name.get(name) else {
            return Vec::new();
        };
        self.graph
            .children(idx)
            .iter(&self.graph)
            .filter_map(|(_, child)| self.graph.node_weight(child))
            .collect()
    }

    /// Stages owned by the pipeline, in input order.
    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Look up a stage by name.
    pub fn stage(&self, name: &str) -> Option<&dyn Stage> {
        self.stages
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// A sender onto this pipeline's bus.
    ///
    /// `None` once a run loop has taken the bus. Senders obtained here keep
    /// the bus open while they live.
    pub fn bus(&self) -> Option<BusSender> {
        self.bus_sender.clone()
    }

    /// Hand the receiving side to the run loop. From then on only the
    /// runtime (and senders handed out earlier) keep the bus open.
    pub(crate) fn take_bus(&mut self) -> Option<BusReceiver> {
        self.bus_sender = None;
        self.bus.take()
    }

    pub(crate) fn set_stages(&mut self, stages: Vec<Box<dyn Stage>>) {
        self.stages = stages;
    }

    /// Register a unit. Unit names must be unique within the pipeline.
    pub fn add_unit(&mut self, unit: UnitRef) -> Result<()> {
        let name = unit.name().to_string();
        if self.units_by_name.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "unit name '{name}' is already used in pipeline '{}'",
                self.name
            )));
        }
        let idx = self.graph.add_node(unit);
        self.units_by_name.insert(name, idx);
        Ok(())
    }

    /// Link `src` to `sink` through the native runtime and record the link.
    pub fn link_pads(&mut self, src: &Pad, sink: &Pad) -> Result<()> {
        let src_idx = self.node(src, sink, src.unit())?;
        let sink_idx = self.node(src, sink, sink.unit())?;

        if !self.runtime.link(src, sink) {
            return Err(Error::link(
                src.to_string(),
                sink.to_string(),
                "link refused by runtime",
            ));
        }

        let link = Link {
            src: src.clone(),
            sink: sink.clone(),
        };
        self.graph
            .add_edge(src_idx, sink_idx, link)
            .map_err(|_| {
                Error::link(src.to_string(), sink.to_string(), "link would create a cycle")
            })?;

        observability::trace_link(&self.name, src, sink);
        observability::record_link(&self.name);
        Ok(())
    }

    fn node(&self, src: &Pad, sink: &Pad, unit: &str) -> Result<NodeIndex> {
        self.units_by_name.get(unit).copied().ok_or_else(|| {
            Error::link(
                src.to_string(),
                sink.to_string(),
                format!("unit '{unit}' is not part of pipeline '{}'", self.name),
            )
        })
    }

    /// Move every unit to `state`, downstream units first.
    pub fn set_state(&mut self, state: UnitState) -> Result<()> {
        for node in self.graph.raw_nodes().iter().rev() {
            node.weight.set_state(state)?;
        }
        observability::trace_state_change(&self.name, self.state, state);
        self.state = state;
        Ok(())
    }

    /// Bring the pipeline from `Null` through `Idle` to `Running`.
    pub fn start(&mut self) -> Result<()> {
        self.set_state(UnitState::Idle)?;
        self.set_state(UnitState::Running)
    }

    /// Move every unit to `Null`, in reverse construction order.
    ///
    /// Runs at most once; returns `false` if the pipeline was already torn
    /// down. Units refusing the transition are logged and skipped.
    pub fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;

        for node in self.graph.raw_nodes().iter().rev() {
            if let Err(e) = node.weight.set_state(UnitState::Null) {
                tracing::warn!(pipeline = %self.name, error = %e, "teardown incomplete");
            }
        }
        observability::trace_state_change(&self.name, self.state, UnitState::Null);
        observability::record_teardown(&self.name);
        self.state = UnitState::Null;
        true
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("units", &self.unit_count())
            .field("links", &self.link_count())
            .field("stages", &self.stages.len())
            .field("state", &self.state)
            .finish()
    }
}
