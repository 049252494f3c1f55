//! Tracing integration for structured logging and spans.

use crate::pipeline::BusMessage;
use crate::runtime::{Pad, UnitState};
use tracing::{Level, Span, span};

/// Create a span covering a pipeline's composition or run.
///
/// ```rust
/// use stream_compose::observability::span_pipeline;
///
/// let span = span_pipeline("my-pipeline");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for one stage being initialized and linked.
#[inline]
pub fn span_stage(pipeline: &str, stage: &str, role: &str) -> Span {
    span!(
        Level::DEBUG,
        "stage",
        pipeline = %pipeline,
        stage = %stage,
        role = %role
    )
}

/// Log a pad link.
#[inline]
pub fn trace_link(pipeline: &str, src: &Pad, sink: &Pad) {
    tracing::debug!(
        pipeline = %pipeline,
        src = %src,
        sink = %sink,
        "pads linked"
    );
}

/// Log a pipeline state change.
#[inline]
pub fn trace_state_change(pipeline: &str, from: UnitState, to: UnitState) {
    tracing::info!(
        pipeline = %pipeline,
        from = %from,
        to = %to,
        "pipeline state changed"
    );
}

/// Log a bus message at the level matching its kind.
pub fn trace_bus_message(pipeline: &str, message: &BusMessage) {
    let origin = message.origin().unwrap_or("pipeline");
    match message {
        BusMessage::Eos { .. } => {
            tracing::info!(pipeline = %pipeline, origin = %origin, "end of stream");
        }
        BusMessage::Info { message, debug: detail, .. } => {
            tracing::info!(
                pipeline = %pipeline,
                origin = %origin,
                detail = detail.as_deref().unwrap_or(""),
                "{message}"
            );
        }
        BusMessage::Warning { message, debug: detail, .. } => {
            tracing::warn!(
                pipeline = %pipeline,
                origin = %origin,
                detail = detail.as_deref().unwrap_or(""),
                "{message}"
            );
        }
        BusMessage::Error { message, cause, .. } => {
            tracing::error!(
                pipeline = %pipeline,
                origin = %origin,
                cause = %cause,
                "{message}"
            );
        }
    }
}
