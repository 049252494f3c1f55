//! Boundary to the native multimedia runtime.
//!
//! The composition engine never touches codecs, inference backends or
//! display code itself. It talks to a [`NativeRuntime`] that can:
//!
//! - create named processing units of a given kind ([`NativeRuntime::make_unit`])
//! - link a src pad to a sink pad ([`NativeRuntime::link`])
//! - deliver asynchronous bus messages ([`NativeRuntime::attach_bus`])
//!
//! Units are reference-counted handles ([`UnitRef`]), the same way native
//! element handles are shared between the stage that created them and the
//! pipeline that drives them.
//!
//! [`sim::SimRuntime`] is an in-memory implementation that records every
//! operation and can inject failures.

mod pad;
mod property;
pub mod sim;

pub use pad::{Pad, PadDirection, PadPresence, PadTemplate};
pub use property::PropertyValue;

use crate::error::{Error, Result};
use crate::pipeline::BusSender;
use std::fmt;
use std::sync::Arc;

/// State of a native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitState {
    /// Torn down, no resources held.
    #[default]
    Null,
    /// Resources allocated, not processing.
    Idle,
    /// Processing data.
    Running,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Null => "null",
            UnitState::Idle => "idle",
            UnitState::Running => "running",
        };
        f.write_str(s)
    }
}

/// A native processing unit.
///
/// Implementations use interior mutability: units are shared through
/// [`UnitRef`] handles.
pub trait NativeUnit: Send + Sync + fmt::Debug {
    /// Unique unit name.
    fn name(&self) -> &str;

    /// Factory kind the unit was created from.
    fn kind(&self) -> &str;

    /// Look up an always-present pad.
    fn static_pad(&self, name: &str) -> Option<Pad>;

    /// Create a request pad.
    fn request_pad(&self, name: &str) -> Option<Pad>;

    /// Set a property.
    fn set_property(&self, key: &str, value: PropertyValue) -> Result<()>;

    /// Read back a property.
    fn property(&self, key: &str) -> Option<PropertyValue>;

    /// Move the unit to `state`.
    fn set_state(&self, state: UnitState) -> Result<()>;

    /// Current state.
    fn state(&self) -> UnitState;
}

/// Shared handle to a native unit.
pub type UnitRef = Arc<dyn NativeUnit>;

/// The native multimedia runtime.
pub trait NativeRuntime: Send + Sync {
    /// Create a unit of `kind` named `name`. Returns `None` when the runtime
    /// cannot allocate it (unknown kind, missing plugin, out of resources).
    fn make_unit(&self, kind: &str, name: &str) -> Option<UnitRef>;

    /// Link `src` to `sink`. Returns `false` when the runtime refuses.
    fn link(&self, src: &Pad, sink: &Pad) -> bool;

    /// Register the bus that receives this runtime's messages.
    fn attach_bus(&self, bus: BusSender);
}

/// Create a unit or fail with [`Error::StageCreation`].
pub fn make_unit(
    runtime: &dyn NativeRuntime,
    stage: &str,
    kind: &str,
    name: &str,
) -> Result<UnitRef> {
    runtime.make_unit(kind, name).ok_or_else(|| Error::StageCreation {
        stage: stage.to_string(),
        kind: kind.to_string(),
    })
}
