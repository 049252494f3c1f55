//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const PIPELINES_BUILT: &str = "stream_compose_pipelines_built";
const BUILD_FAILURES: &str = "stream_compose_build_failures";
const LINKS_CREATED: &str = "stream_compose_links_created";
const STAGE_INIT_TIME_NS: &str = "stream_compose_stage_init_time_ns";
const BUS_MESSAGES: &str = "stream_compose_bus_messages";
const TEARDOWNS: &str = "stream_compose_teardowns";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        PIPELINES_BUILT,
        Unit::Count,
        "Pipelines successfully composed"
    );
    metrics::describe_counter!(
        BUILD_FAILURES,
        Unit::Count,
        "Pipeline compositions that failed"
    );
    metrics::describe_counter!(LINKS_CREATED, Unit::Count, "Pad links made");
    metrics::describe_histogram!(
        STAGE_INIT_TIME_NS,
        Unit::Nanoseconds,
        "Time to allocate the native units of a stage"
    );
    metrics::describe_counter!(BUS_MESSAGES, Unit::Count, "Bus messages handled");
    metrics::describe_counter!(TEARDOWNS, Unit::Count, "Pipeline teardowns");
}

/// Record a composed pipeline.
#[inline]
pub fn record_pipeline_built(pipeline: &str, stages: usize) {
    counter!(PIPELINES_BUILT, "pipeline" => pipeline.to_string()).increment(1);
    tracing::debug!(pipeline = %pipeline, stages, "pipeline built");
}

/// Record a failed composition.
#[inline]
pub fn record_build_failure(pipeline: &str) {
    counter!(BUILD_FAILURES, "pipeline" => pipeline.to_string()).increment(1);
}

/// Record a pad link.
#[inline]
pub fn record_link(pipeline: &str) {
    counter!(LINKS_CREATED, "pipeline" => pipeline.to_string()).increment(1);
}

/// Record the time spent initializing a stage.
#[inline]
pub fn record_stage_init_time(pipeline: &str, stage: &str, duration: Duration) {
    histogram!(STAGE_INIT_TIME_NS, "pipeline" => pipeline.to_string(), "stage" => stage.to_string())
        .record(duration.as_nanos() as f64);
}

/// Record a teardown.
#[inline]
pub fn record_teardown(pipeline: &str) {
    counter!(TEARDOWNS, "pipeline" => pipeline.to_string()).increment(1);
}

/// Bus message counters for one running pipeline.
#[derive(Clone)]
pub struct PipelineMetrics {
    name: String,
    eos: Counter,
    info: Counter,
    warnings: Counter,
    errors: Counter,
}

impl PipelineMetrics {
    /// Create the counters for pipeline `name`.
    pub fn new(name: &str) -> Self {
        let by_kind = |kind: &'static str| {
            counter!(BUS_MESSAGES, "pipeline" => name.to_string(), "kind" => kind)
        };
        Self {
            name: name.to_string(),
            eos: by_kind("eos"),
            info: by_kind("info"),
            warnings: by_kind("warning"),
            errors: by_kind("error"),
        }
    }

    /// Count one bus message of `kind`.
    #[inline]
    pub fn record_message(&self, kind: &str) {
        match kind {
            "eos" => self.eos.increment(1),
            "info" => self.info.increment(1),
            "warning" => self.warnings.increment(1),
            "error" => self.errors.increment(1),
            _ => {}
        }
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
