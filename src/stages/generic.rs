//! Stage wrapping any single native unit kind.

use crate::error::Result;
use crate::runtime::{NativeRuntime, PropertyValue, UnitRef, make_unit};
use crate::stage::{Stage, StageRole, ensure_uninitialized};

/// A stage for a native kind without dedicated wrapper.
///
/// Only plain roles are available: the aggregator, multiplexer and
/// inference roles need the capabilities of their dedicated stages.
///
/// ```rust
/// use stream_compose::stages::NativeStage;
/// use stream_compose::stage::{Stage, StageRole};
///
/// let queue = NativeStage::filter("queue", "q0").with_property("max-size-buffers", 4u32);
/// assert_eq!(queue.role(), StageRole::Filter);
/// assert_eq!(queue.name(), "q0");
/// ```
#[derive(Debug)]
pub struct NativeStage {
    name: String,
    kind: String,
    role: StageRole,
    properties: Vec<(String, PropertyValue)>,
    units: Vec<UnitRef>,
}

impl NativeStage {
    fn new(kind: &str, name: &str, role: StageRole) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            role,
            properties: Vec::new(),
            units: Vec::new(),
        }
    }

    /// A source unit.
    pub fn source(kind: &str, name: &str) -> Self {
        Self::new(kind, name, StageRole::Source)
    }

    /// A filter unit.
    pub fn filter(kind: &str, name: &str) -> Self {
        Self::new(kind, name, StageRole::Filter)
    }

    /// A sink unit.
    pub fn sink(kind: &str, name: &str) -> Self {
        Self::new(kind, name, StageRole::Sink)
    }

    /// Set a property applied on initialization.
    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((key.to_string(), value.into()));
        self
    }

    /// Native unit kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Stage for NativeStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        self.role
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let unit = make_unit(runtime, &self.name, &self.kind, &self.name)?;
        for (key, value) in &self.properties {
            unit.set_property(key, value.clone())?;
        }
        self.units.push(unit);
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }
}
