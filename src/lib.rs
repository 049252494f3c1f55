//! # stream-compose
//!
//! Composition and linking engine for video-analytics pipelines built from
//! native multimedia processing units.
//!
//! A pipeline is described as an ordered list of [`Stage`](stage::Stage)s:
//! sources, an aggregator bundling several sources, a multiplexer batching
//! them, filters such as color conversion and inference, and a sink. The
//! [`PipelineBuilder`](pipeline::PipelineBuilder) validates the order, wires
//! pads according to each stage's role and derives configuration across
//! stage boundaries (inference batch size from the source count, liveness
//! from the source URIs). The [`Runloop`](pipeline::Runloop) then runs the
//! pipeline, dispatches bus messages and tears everything down exactly once.
//!
//! The crate never touches media data itself: it drives a
//! [`NativeRuntime`](runtime::NativeRuntime). [`runtime::sim::SimRuntime`]
//! is an in-memory runtime for tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use stream_compose::prelude::*;
//! use stream_compose::runtime::sim::SimRuntime;
//!
//! let runtime = SimRuntime::new();
//! let sources = AggregatedSources::new(vec![
//!     UriSource::new("rtsp://camera-1/stream"),
//!     UriSource::new("rtsp://camera-2/stream"),
//! ]);
//!
//! let pipeline = PipelineBuilder::new(Arc::new(runtime.clone()))
//!     .name("cameras")
//!     .stage(sources)
//!     .stage(StreamMux::new(StreamMuxConfig::new(2)))
//!     .stage(VideoConvert::new(FilterProperties::new()))
//!     .stage(InferServer::new(InferServerConfig::new("/app/models", "segmentation")))
//!     .stage(DisplaySink::new(false))
//!     .build()?;
//!
//! let inference = pipeline.stages()[3].as_inference_filter().map(|f| f.batch_size());
//! assert_eq!(inference, Some(2));
//!
//! runtime.post(BusMessage::eos());
//! let mut runloop = Runloop::new(pipeline);
//! runloop.run_blocking()?;
//! # Ok::<(), stream_compose::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod stage;
pub mod stages;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::format::{FilterProperties, MemoryKind, PixelFormat};
    pub use crate::pipeline::{
        BusHandler, BusMessage, LoopControl, Pipeline, PipelineBuilder, RunState, Runloop,
        RunloopConfig, ShutdownHandle,
    };
    pub use crate::runtime::{NativeRuntime, NativeUnit, UnitRef, UnitState};
    pub use crate::stage::{Stage, StageRole};
    pub use crate::stages::{
        AggregatedSources, DisplaySink, InferServer, InferServerConfig, NativeStage, StreamMux,
        StreamMuxConfig, TransformChain, UriSource, VideoConvert,
    };
}

pub use error::{Error, Result};
