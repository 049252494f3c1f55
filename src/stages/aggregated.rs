//! Source bin combining several URI sources.

use super::UriSource;
use crate::error::{Error, Result};
use crate::runtime::{NativeRuntime, Pad, UnitRef, make_unit};
use crate::stage::{
    AggregatedSourcesCapability, Stage, StageRole, ensure_uninitialized, generate_name,
};

/// Aggregates several [`UriSource`]s behind one bin.
///
/// Each source feeds a numbered `sink_<i>` pad of the bin; the bin's single
/// `src` pad is what the multiplexer fans in from.
#[derive(Debug)]
pub struct AggregatedSources {
    name: String,
    sources: Vec<UriSource>,
    units: Vec<UnitRef>,
}

impl AggregatedSources {
    /// Native unit kind of the bin.
    pub const KIND: &'static str = "bin";

    /// Aggregate `sources`.
    pub fn new(sources: Vec<UriSource>) -> Self {
        Self::named(generate_name(), sources)
    }

    /// Aggregate `sources` under an explicit base name.
    pub fn named(name: impl AsRef<str>, sources: Vec<UriSource>) -> Self {
        Self {
            name: format!("{}-sources-bin", name.as_ref()),
            sources,
            units: Vec::new(),
        }
    }

    /// The wrapped sources.
    pub fn sources(&self) -> &[UriSource] {
        &self.sources
    }
}

impl Stage for AggregatedSources {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Aggregator
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let bin = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        bin.set_property("num-sources", self.sources.len().into())?;
        bin.set_property("live", self.is_live().into())?;

        let mut units = vec![bin];
        for source in &mut self.sources {
            source.initialize(runtime)?;
            units.extend(source.units().iter().cloned());
        }
        self.units = units;
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }

    fn output_unit(&self) -> Option<&UnitRef> {
        self.units.first()
    }

    fn input_unit(&self) -> Option<&UnitRef> {
        None
    }

    fn internal_links(&self) -> Result<Vec<(Pad, Pad)>> {
        let Some(bin) = self.units.first() else {
            return Ok(Vec::new());
        };
        let mut links = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let sink_name = format!("sink_{index}");
            let unit = source.output_unit().ok_or_else(|| {
                Error::Configuration(format!("source '{}' has no unit", source.name()))
            })?;
            let src = unit.static_pad("src").ok_or_else(|| {
                Error::link(
                    format!("{}:src", unit.name()),
                    format!("{}:{sink_name}", bin.name()),
                    "source pad not available",
                )
            })?;
            let sink = bin.request_pad(&sink_name).ok_or_else(|| {
                Error::link(
                    src.to_string(),
                    format!("{}:{sink_name}", bin.name()),
                    "unable to request bin sink pad",
                )
            })?;
            links.push((src, sink));
        }
        Ok(links)
    }

    fn as_aggregator(&self) -> Option<&dyn AggregatedSourcesCapability> {
        Some(self)
    }
}

impl AggregatedSourcesCapability for AggregatedSources {
    fn num_sources(&self) -> usize {
        self.sources.len()
    }

    fn is_live(&self) -> bool {
        self.sources.iter().any(UriSource::is_live)
    }
}
