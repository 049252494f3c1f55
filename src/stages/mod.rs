//! Built-in pipeline stages.
//!
//! ## Sources
//! - [`UriSource`]: Decodes media from a URI
//! - [`AggregatedSources`]: Bins several URI sources behind one output
//!
//! ## Multiplexing
//! - [`StreamMux`]: Batches the aggregated sources into one stream
//!
//! ## Filters
//! - [`VideoConvert`]: Color conversion plus caps filter
//! - [`InferServer`]: Model inference, batch size follows the source count
//! - [`TransformChain`]: Opaque transform over labeled tensors
//!
//! ## Sinks
//! - [`DisplaySink`]: Renders to a display
//!
//! ## Other
//! - [`NativeStage`]: Any single native unit kind

mod aggregated;
mod display;
mod generic;
mod inferserver;
mod streammux;
mod transform;
mod uri_source;
mod videoconvert;

pub use aggregated::AggregatedSources;
pub use display::DisplaySink;
pub use generic::NativeStage;
pub use inferserver::{InferServer, InferServerConfig};
pub use streammux::{StreamMux, StreamMuxConfig};
pub use transform::{LabeledTensors, Tensor, TransformChain};
pub use uri_source::UriSource;
pub use videoconvert::VideoConvert;
