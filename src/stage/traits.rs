//! Core stage traits.

use super::chain_pads;
use crate::error::Result;
use crate::runtime::{NativeRuntime, Pad, UnitRef};
use std::fmt;

/// Linking role of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    /// Standalone media source.
    Source,
    /// Combines several sources into one output with a source count.
    Aggregator,
    /// Fans the aggregator's sources into numbered sink pads.
    Multiplexer,
    /// Inference stage whose batch size follows the source count.
    InferenceFilter,
    /// Plain filter in the linear chain.
    Filter,
    /// Terminal stage.
    Sink,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageRole::Source => "source",
            StageRole::Aggregator => "aggregator",
            StageRole::Multiplexer => "multiplexer",
            StageRole::InferenceFilter => "inference-filter",
            StageRole::Filter => "filter",
            StageRole::Sink => "sink",
        };
        f.write_str(s)
    }
}

/// A pipeline stage wrapping native processing units.
pub trait Stage: Send {
    /// Stable identity, unique within a pipeline.
    fn name(&self) -> &str;

    /// Linking role.
    fn role(&self) -> StageRole;

    /// Allocate the native units. Fails with
    /// [`Error::StageCreation`](crate::Error::StageCreation) when the
    /// runtime cannot create one.
    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()>;

    /// Owned units in sub-chain order. Empty before [`initialize`](Self::initialize).
    fn units(&self) -> &[UnitRef];

    /// Whether [`initialize`](Self::initialize) has run.
    fn is_initialized(&self) -> bool {
        !self.units().is_empty()
    }

    /// Unit whose `src` pad feeds the next stage.
    fn output_unit(&self) -> Option<&UnitRef> {
        self.units().last()
    }

    /// Unit whose `sink` pad receives from the previous stage.
    fn input_unit(&self) -> Option<&UnitRef> {
        self.units().first()
    }

    /// Pad pairs linking the stage's own units together.
    ///
    /// The default links consecutive units `src` to `sink`.
    fn internal_links(&self) -> Result<Vec<(Pad, Pad)>> {
        self.units()
            .windows(2)
            .map(|pair| chain_pads(pair[0].as_ref(), pair[1].as_ref()))
            .collect()
    }

    /// Aggregator capability.
    fn as_aggregator(&self) -> Option<&dyn AggregatedSourcesCapability> {
        None
    }

    /// Multiplexer capability.
    fn as_multiplexer_mut(&mut self) -> Option<&mut dyn MultiplexerCapability> {
        None
    }

    /// Inference filter capability.
    fn as_inference_filter(&self) -> Option<&dyn InferenceFilterCapability> {
        None
    }

    /// Mutable inference filter capability.
    fn as_inference_filter_mut(&mut self) -> Option<&mut dyn InferenceFilterCapability> {
        None
    }
}

/// A stage combining several media sources.
pub trait AggregatedSourcesCapability {
    /// Number of sources fanned out to the multiplexer.
    fn num_sources(&self) -> usize;

    /// Whether any source is live.
    fn is_live(&self) -> bool;
}

/// A stage accepting numbered sink pads from an aggregator.
pub trait MultiplexerCapability {
    /// Propagate the upstream liveness flag.
    fn set_is_live(&mut self, live: bool) -> Result<()>;

    /// Set how many streams form one batch.
    fn set_batch_size(&mut self, batch_size: usize) -> Result<()>;

    /// Request the sink pad for source `index`.
    fn request_sink_pad(&mut self, index: usize) -> Option<Pad>;
}

/// A stage whose batch size follows the aggregator's source count.
pub trait InferenceFilterCapability {
    /// Set the batch size.
    fn set_batch_size(&mut self, batch_size: usize) -> Result<()>;

    /// Current batch size.
    fn batch_size(&self) -> usize;
}
