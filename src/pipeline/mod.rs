//! Pipeline composition and execution.
//!
//! - [`PipelineBuilder`]: validates stages and links their units
//! - [`Pipeline`]: registered units, pad links and state
//! - [`Runloop`]: runs a pipeline and dispatches its [`BusMessage`]s
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stream_compose::pipeline::{BusMessage, PipelineBuilder, Runloop};
//! use stream_compose::runtime::sim::SimRuntime;
//! use stream_compose::stages::{DisplaySink, NativeStage};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let runtime = SimRuntime::new();
//! let pipeline = PipelineBuilder::new(Arc::new(runtime.clone()))
//!     .stage(NativeStage::source("videotestsrc", "test-src"))
//!     .stage(DisplaySink::new(true))
//!     .build()?;
//!
//! let mut runloop = Runloop::new(pipeline);
//! runtime.post(BusMessage::eos());
//! runloop.run().await?;
//! # Ok::<(), stream_compose::Error>(())
//! # }).unwrap();
//! ```

mod builder;
mod events;
mod graph;
mod runloop;

pub use builder::PipelineBuilder;
pub use events::{BusMessage, BusReceiver, BusSender, bus};
pub use graph::{Link, Pipeline};
pub use runloop::{
    BusHandler, DefaultHandler, LoopControl, RunState, Runloop, RunloopConfig, ShutdownHandle,
};
