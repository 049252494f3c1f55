//! Observability features: metrics and tracing.
//!
//! - **Metrics**: counters and histograms via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `stream_compose_pipelines_built` | Counter | Pipelines successfully composed |
//! | `stream_compose_build_failures` | Counter | Compositions that failed |
//! | `stream_compose_links_created` | Counter | Pad links made |
//! | `stream_compose_stage_init_time_ns` | Histogram | Stage unit allocation time |
//! | `stream_compose_bus_messages` | Counter | Bus messages handled, by `kind` |
//! | `stream_compose_teardowns` | Counter | Pipeline teardowns |
//!
//! No recorder is installed by this crate; install an exporter of your
//! choice and call [`init_metrics`] once to register the descriptions.
//!
//! ## Tracing
//!
//! Composition and the run loop execute inside a `pipeline` span; each
//! stage is initialized inside a `stage` span.

mod metrics;
mod tracing_support;

pub use metrics::{
    PipelineMetrics, init_metrics, record_build_failure, record_link, record_pipeline_built,
    record_stage_init_time, record_teardown,
};
pub use tracing_support::{
    span_pipeline, span_stage, trace_bus_message, trace_link, trace_state_change,
};
