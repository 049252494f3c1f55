//! The contract every pipeline stage implements.
//!
//! A [`Stage`] wraps one or more native units. The builder only ever talks
//! to stages through this trait:
//!
//! - [`Stage::initialize`] allocates the native units (the only side effect)
//! - [`Stage::units`] exposes them for registration into the pipeline
//! - [`Stage::role`] selects the linking rule the builder applies
//! - the `as_*` queries expose the role-specific capabilities
//!
//! # Example
//!
//! ```rust
//! use stream_compose::stage::{Stage, StageRole};
//! use stream_compose::stages::DisplaySink;
//! use stream_compose::runtime::sim::SimRuntime;
//!
//! let runtime = SimRuntime::new();
//! let mut sink = DisplaySink::new(true).with_name("screen");
//! assert!(!sink.is_initialized());
//!
//! sink.initialize(&runtime).unwrap();
//! assert_eq!(sink.role(), StageRole::Sink);
//! assert_eq!(sink.units().len(), 1);
//! ```

mod traits;

pub use traits::{
    AggregatedSourcesCapability, InferenceFilterCapability, MultiplexerCapability, Stage,
    StageRole,
};

use crate::error::{Error, Result};
use crate::runtime::{NativeUnit, UnitRef};

/// Generate a stage base name for stages constructed without one.
pub fn generate_name() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Fail with a configuration error if a stage is initialized twice.
pub(crate) fn ensure_uninitialized(stage: &str, units: &[UnitRef]) -> Result<()> {
    if units.is_empty() {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "stage '{stage}' is already initialized"
        )))
    }
}

/// Static `src` pad of `upstream` linked to static `sink` pad of `downstream`.
pub(crate) fn chain_pads(
    upstream: &dyn NativeUnit,
    downstream: &dyn NativeUnit,
) -> Result<(crate::runtime::Pad, crate::runtime::Pad)> {
    let src = upstream.static_pad("src").ok_or_else(|| {
        Error::link(
            format!("{}:src", upstream.name()),
            format!("{}:sink", downstream.name()),
            "source pad not available",
        )
    })?;
    let sink = downstream.static_pad("sink").ok_or_else(|| {
        Error::link(
            src.to_string(),
            format!("{}:sink", downstream.name()),
            "sink pad not available",
        )
    })?;
    Ok((src, sink))
}
