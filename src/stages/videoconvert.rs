//! Color conversion followed by a caps filter.

use crate::error::Result;
use crate::format::FilterProperties;
use crate::runtime::{NativeRuntime, UnitRef, make_unit};
use crate::stage::{Stage, StageRole, ensure_uninitialized, generate_name};

/// Converts frames and pins the output format.
///
/// Composite stage: a converter unit linked to a caps filter carrying the
/// rendered [`FilterProperties`].
#[derive(Debug)]
pub struct VideoConvert {
    base: String,
    name: String,
    filter: FilterProperties,
    units: Vec<UnitRef>,
}

impl VideoConvert {
    /// Native kind of the converter.
    pub const KIND: &'static str = "nvvideoconvert";
    /// Native kind of the caps filter.
    pub const FILTER_KIND: &'static str = "capsfilter";

    /// Create a converter producing `filter`.
    pub fn new(filter: FilterProperties) -> Self {
        Self::named(generate_name(), filter)
    }

    /// Create a converter with an explicit base name.
    pub fn named(name: impl Into<String>, filter: FilterProperties) -> Self {
        let base = name.into();
        Self {
            name: format!("{base}-{}", Self::KIND),
            base,
            filter,
            units: Vec::new(),
        }
    }

    /// Output format.
    pub fn filter(&self) -> &FilterProperties {
        &self.filter
    }
}

impl Stage for VideoConvert {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Filter
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let convert = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        let caps = make_unit(
            runtime,
            &self.name,
            Self::FILTER_KIND,
            &format!("{}-filter", self.base),
        )?;
        caps.set_property("caps", self.filter.to_caps_string().into())?;
        self.units = vec![convert, caps];
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }
}
