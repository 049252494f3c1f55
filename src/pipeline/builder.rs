//! Pipeline composition.
//!
//! [`PipelineBuilder`] takes stages in input order and makes a single pass
//! over them: each stage is initialized and its units registered, then the
//! role-specific rule for the stage is applied. Once every stage is placed,
//! adjacent stages are linked `src` to `sink` starting at the multiplexer
//! (or at the first stage when there is none).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stream_compose::pipeline::PipelineBuilder;
//! use stream_compose::runtime::sim::SimRuntime;
//! use stream_compose::stages::{
//!     AggregatedSources, DisplaySink, StreamMux, StreamMuxConfig, UriSource,
//! };
//!
//! let runtime = SimRuntime::new();
//! let sources = AggregatedSources::new(vec![
//!     UriSource::new("file:///videos/a.mp4"),
//!     UriSource::new("file:///videos/b.mp4"),
//! ]);
//!
//! let pipeline = PipelineBuilder::new(Arc::new(runtime.clone()))
//!     .name("two-cameras")
//!     .stage(sources)
//!     .stage(StreamMux::new(StreamMuxConfig::new(2)))
//!     .stage(DisplaySink::new(false))
//!     .build()
//!     .unwrap();
//!
//! // Sources into the bin, bin into the mux, mux into the sink.
//! assert_eq!(pipeline.link_count(), 2 + 2 + 1);
//! ```

use super::graph::Pipeline;
use crate::error::{Error, Result};
use crate::observability::{
    record_build_failure, record_pipeline_built, record_stage_init_time, span_pipeline,
    span_stage,
};
use crate::runtime::NativeRuntime;
use crate::stage::{Stage, StageRole, chain_pads, generate_name};
use std::sync::Arc;
use std::time::Instant;

/// Builds a [`Pipeline`] from an ordered list of stages.
pub struct PipelineBuilder {
    runtime: Arc<dyn NativeRuntime>,
    name: String,
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    /// Create a builder composing units of `runtime`.
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            runtime,
            name: format!("pipeline-{}", generate_name()),
            stages: Vec::new(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a stage.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append already boxed stages.
    pub fn stages(mut self, stages: impl IntoIterator<Item = Box<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Number of stages added so far.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage was added.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Initialize, register and link every stage.
    ///
    /// On failure the partially built pipeline is torn down before the
    /// error is returned.
    pub fn build(self) -> Result<Pipeline> {
        let Self {
            runtime,
            name,
            mut stages,
        } = self;
        let span = span_pipeline(&name);
        let _guard = span.enter();

        let mut pipeline = Pipeline::new(name, Arc::clone(&runtime));
        match compose(&mut pipeline, runtime.as_ref(), &mut stages) {
            Ok(()) => {
                record_pipeline_built(pipeline.name(), stages.len());
                tracing::info!(
                    units = pipeline.unit_count(),
                    links = pipeline.link_count(),
                    "pipeline composed"
                );
                pipeline.set_stages(stages);
                Ok(pipeline)
            }
            Err(e) => {
                tracing::warn!(error = %e, "composition failed, tearing down");
                record_build_failure(pipeline.name());
                pipeline.teardown();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn compose(
    pipeline: &mut Pipeline,
    runtime: &dyn NativeRuntime,
    stages: &mut [Box<dyn Stage>],
) -> Result<()> {
    let mut aggregator: Option<usize> = None;
    let mut multiplexer: Option<usize> = None;
    let mut chain_start = 0;

    for index in 0..stages.len() {
        let role = stages[index].role();
        let span = span_stage(pipeline.name(), stages[index].name(), &role.to_string());
        let _guard = span.enter();

        place(pipeline, runtime, stages[index].as_mut())?;

        match role {
            StageRole::Aggregator => {
                if let Some(first) = aggregator {
                    return Err(Error::Configuration(format!(
                        "stage '{}' is a second aggregator, '{}' already aggregates the sources",
                        stages[index].name(),
                        stages[first].name()
                    )));
                }
                aggregator = Some(index);
            }
            StageRole::Multiplexer => {
                if let Some(first) = multiplexer {
                    return Err(Error::Configuration(format!(
                        "stage '{}' is a second multiplexer, '{}' already multiplexes",
                        stages[index].name(),
                        stages[first].name()
                    )));
                }
                let Some(agg) = aggregator.filter(|&agg| agg + 1 == index) else {
                    return Err(Error::Configuration(format!(
                        "multiplexer '{}' must immediately follow an aggregator",
                        stages[index].name()
                    )));
                };
                let (head, tail) = stages.split_at_mut(index);
                link_fan_in(pipeline, head[agg].as_ref(), tail[0].as_mut())?;
                multiplexer = Some(index);
                chain_start = index;
            }
            StageRole::InferenceFilter => {
                let Some(agg) = aggregator else {
                    return Err(Error::Configuration(format!(
                        "inference filter '{}' needs an aggregator upstream",
                        stages[index].name()
                    )));
                };
                let batch_size = num_sources(stages[agg].as_ref())?;
                let stage = stages[index].as_mut();
                let name = stage.name().to_string();
                stage
                    .as_inference_filter_mut()
                    .ok_or_else(|| missing_capability(&name, role))?
                    .set_batch_size(batch_size)?;
                tracing::debug!(stage = %name, batch_size, "batch size propagated");
            }
            StageRole::Source | StageRole::Filter | StageRole::Sink => {}
        }
    }

    for pair in stages[chain_start..].windows(2) {
        link_stages(pipeline, pair[0].as_ref(), pair[1].as_ref())?;
    }
    Ok(())
}

/// Initialize a stage, register its units and link its sub-chain.
fn place(
    pipeline: &mut Pipeline,
    runtime: &dyn NativeRuntime,
    stage: &mut dyn Stage,
) -> Result<()> {
    let started = Instant::now();
    stage.initialize(runtime)?;
    record_stage_init_time(pipeline.name(), stage.name(), started.elapsed());

    for unit in stage.units() {
        pipeline.add_unit(Arc::clone(unit))?;
    }
    for (src, sink) in stage.internal_links()? {
        pipeline.link_pads(&src, &sink)?;
    }
    tracing::debug!(units = stage.units().len(), "stage placed");
    Ok(())
}

fn num_sources(aggregator: &dyn Stage) -> Result<usize> {
    aggregator
        .as_aggregator()
        .map(|agg| agg.num_sources())
        .ok_or_else(|| missing_capability(aggregator.name(), StageRole::Aggregator))
}

fn missing_capability(stage: &str, role: StageRole) -> Error {
    Error::Configuration(format!(
        "stage '{stage}' declares the {role} role but does not implement it"
    ))
}

/// Link the aggregator's `src` pad into one requested multiplexer sink pad
/// per source.
fn link_fan_in(
    pipeline: &mut Pipeline,
    aggregator: &dyn Stage,
    multiplexer: &mut dyn Stage,
) -> Result<()> {
    let agg = aggregator
        .as_aggregator()
        .ok_or_else(|| missing_capability(aggregator.name(), StageRole::Aggregator))?;
    let (sources, live) = (agg.num_sources(), agg.is_live());
    let output = aggregator.output_unit().cloned().ok_or_else(|| {
        Error::Configuration(format!("aggregator '{}' has no output unit", aggregator.name()))
    })?;

    let mux_name = multiplexer.name().to_string();
    let mux = multiplexer
        .as_multiplexer_mut()
        .ok_or_else(|| missing_capability(&mux_name, StageRole::Multiplexer))?;
    mux.set_is_live(live)?;
    mux.set_batch_size(sources)?;

    for index in 0..sources {
        let src_name = format!("{}:src", output.name());
        let sink = mux.request_sink_pad(index).ok_or_else(|| {
            Error::link(
                src_name.clone(),
                format!("{mux_name}:sink_{index}"),
                "sink pad not available",
            )
        })?;
        let src = output
            .static_pad("src")
            .ok_or_else(|| Error::link(src_name, sink.to_string(), "source pad not available"))?;
        pipeline.link_pads(&src, &sink)?;
    }
    tracing::debug!(multiplexer = %mux_name, sources, live, "sources fanned in");
    Ok(())
}

/// Link the last unit of `upstream` to the first unit of `downstream`.
fn link_stages(
    pipeline: &mut Pipeline,
    upstream: &dyn Stage,
    downstream: &dyn Stage,
) -> Result<()> {
    let output = upstream.output_unit().ok_or_else(|| {
        Error::link(
            format!("{}:src", upstream.name()),
            format!("{}:sink", downstream.name()),
            "upstream stage has no output unit",
        )
    })?;
    let input = downstream.input_unit().ok_or_else(|| {
        Error::link(
            format!("{}:src", output.name()),
            format!("{}:sink", downstream.name()),
            "downstream stage has no input unit",
        )
    })?;
    let (src, sink) = chain_pads(output.as_ref(), input.as_ref())?;
    pipeline.link_pads(&src, &sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FilterProperties;
    use crate::runtime::UnitState;
    use crate::runtime::sim::SimRuntime;
    use crate::stages::{NativeStage, VideoConvert};

    fn builder(runtime: &SimRuntime) -> PipelineBuilder {
        PipelineBuilder::new(Arc::new(runtime.clone())).name("test")
    }

    #[test]
    fn test_empty_build() {
        let runtime = SimRuntime::new();
        let pipeline = builder(&runtime).build().unwrap();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.link_count(), 0);
    }

    #[test]
    fn test_linear_chain() {
        let runtime = SimRuntime::new();
        let pipeline = builder(&runtime)
            .stage(NativeStage::source("videotestsrc", "src"))
            .stage(NativeStage::filter("queue", "q"))
            .stage(NativeStage::sink("fakesink", "sink"))
            .build()
            .unwrap();

        let links: Vec<String> = pipeline
            .links()
            .map(|l| format!("{} -> {}", l.src, l.sink))
            .collect();
        assert_eq!(links, ["src:src -> q:sink", "q:src -> sink:sink"]);
        assert_eq!(pipeline.stages().len(), 3);
    }

    #[test]
    fn test_composite_internal_link() {
        let runtime = SimRuntime::new();
        let pipeline = builder(&runtime)
            .stage(VideoConvert::named("conv", FilterProperties::new()))
            .build()
            .unwrap();

        assert_eq!(pipeline.unit_count(), 2);
        assert_eq!(pipeline.link_count(), 1);
        let link = pipeline.links().next().unwrap();
        assert_eq!(link.src.unit(), "conv-nvvideoconvert");
        assert_eq!(link.sink.unit(), "conv-filter");
    }

    #[test]
    fn test_creation_failure_tears_down() {
        let runtime = SimRuntime::new();
        runtime.fail_kind("fakesink");

        let err = builder(&runtime)
            .stage(NativeStage::source("videotestsrc", "src"))
            .stage(NativeStage::sink("fakesink", "sink"))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::StageCreation { ref kind, .. } if kind == "fakesink"));
        assert!(runtime.units().iter().all(|u| !u.was_in(UnitState::Running)));
    }

    #[test]
    fn test_refused_link() {
        let runtime = SimRuntime::new();
        runtime.refuse_link("src", "sink");

        let err = builder(&runtime)
            .stage(NativeStage::source("videotestsrc", "src"))
            .stage(NativeStage::sink("fakesink", "sink"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Link { .. }));
    }
}
