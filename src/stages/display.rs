//! On-screen video sink.

use crate::error::Result;
use crate::runtime::{NativeRuntime, UnitRef, make_unit};
use crate::stage::{Stage, StageRole, ensure_uninitialized, generate_name};

/// Renders frames to a display.
#[derive(Debug)]
pub struct DisplaySink {
    name: String,
    sync: bool,
    units: Vec<UnitRef>,
}

impl DisplaySink {
    /// Native unit kind.
    pub const KIND: &'static str = "nveglglessink";

    /// Create a sink; `sync` renders against the pipeline clock.
    pub fn new(sync: bool) -> Self {
        Self {
            name: format!("{}-{}", generate_name(), Self::KIND),
            sync,
            units: Vec::new(),
        }
    }

    /// Replace the generated base name.
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = format!("{}-{}", name.as_ref(), Self::KIND);
        self
    }
}

impl Stage for DisplaySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Sink
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let unit = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        unit.set_property("sync", self.sync.into())?;
        self.units.push(unit);
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }
}
