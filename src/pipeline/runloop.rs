//! Pipeline run loop.
//!
//! [`Runloop`] takes a composed [`Pipeline`], moves it to running and
//! dispatches bus messages to a [`BusHandler`] until the handler ends the
//! loop, a shutdown is requested or the bus closes. Whatever ends the loop
//! (including a panicking handler) the pipeline is torn down exactly once.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stream_compose::pipeline::{BusMessage, PipelineBuilder, Runloop, RunState};
//! use stream_compose::runtime::sim::SimRuntime;
//! use stream_compose::stages::NativeStage;
//!
//! let runtime = SimRuntime::new();
//! let pipeline = PipelineBuilder::new(Arc::new(runtime.clone()))
//!     .stage(NativeStage::source("videotestsrc", "src"))
//!     .stage(NativeStage::sink("fakesink", "sink"))
//!     .build()
//!     .unwrap();
//!
//! runtime.post(BusMessage::eos().with_origin("sink"));
//!
//! let mut runloop = Runloop::new(pipeline);
//! runloop.run_blocking().unwrap();
//! assert_eq!(runloop.state(), RunState::Stopped);
//! ```

use super::events::BusMessage;
use super::graph::Pipeline;
use crate::error::{Error, Result};
use crate::observability::{PipelineMetrics, span_pipeline, trace_bus_message};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::Instrument;

/// Run loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Not started yet.
    #[default]
    Idle,
    /// Dispatching bus messages.
    Running,
    /// Ended cleanly.
    Stopped,
    /// Ended on an error, a closed bus or a panic.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Configuration for a [`Runloop`].
#[derive(Debug, Clone, Default)]
pub struct RunloopConfig {
    /// Stop gracefully on Ctrl-C.
    pub handle_ctrl_c: bool,
}

impl RunloopConfig {
    /// Stop gracefully on Ctrl-C.
    pub fn with_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }
}

enum Outcome {
    Quit,
    Fail(Error),
}

/// Lets a [`BusHandler`] end the loop.
#[derive(Default)]
pub struct LoopControl {
    outcome: Option<Outcome>,
}

impl LoopControl {
    /// Stop the loop cleanly after this message.
    pub fn quit(&mut self) {
        self.outcome = Some(Outcome::Quit);
    }

    /// Stop the loop and fail the run with `error`.
    pub fn fail(&mut self, error: Error) {
        self.outcome = Some(Outcome::Fail(error));
    }

    /// Whether the handler ended the loop.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Receives every bus message while the pipeline runs.
///
/// Implemented for closures taking `(&BusMessage, &mut LoopControl)`.
/// Returning `Err` ends the loop and fails the run with that error.
pub trait BusHandler: Send {
    /// Handle one message.
    fn handle(&mut self, message: &BusMessage, control: &mut LoopControl) -> Result<()>;
}

impl<F> BusHandler for F
where
    F: FnMut(&BusMessage, &mut LoopControl) -> Result<()> + Send,
{
    fn handle(&mut self, message: &BusMessage, control: &mut LoopControl) -> Result<()> {
        self(message, control)
    }
}

/// Logs every message, stops on end of stream and fails on errors.
#[derive(Debug, Clone, Default)]
pub struct DefaultHandler {
    pipeline: String,
}

impl DefaultHandler {
    /// Handler logging under `pipeline`.
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
        }
    }
}

impl BusHandler for DefaultHandler {
    fn handle(&mut self, message: &BusMessage, control: &mut LoopControl) -> Result<()> {
        trace_bus_message(&self.pipeline, message);
        match message {
            BusMessage::Eos { .. } => control.quit(),
            BusMessage::Error {
                origin,
                message,
                cause,
            } => control.fail(Error::Runtime {
                origin: origin.clone(),
                message: message.clone(),
                cause: cause.clone(),
            }),
            BusMessage::Info { .. } | BusMessage::Warning { .. } => {}
        }
        Ok(())
    }
}

/// Requests a graceful stop of a [`Runloop`] from anywhere.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Request the loop to stop. A request made before the loop runs stops
    /// it as soon as it starts.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Tears the pipeline down when dropped, also while unwinding.
struct TeardownGuard<'a> {
    pipeline: &'a mut Pipeline,
    state: &'a mut RunState,
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if matches!(*self.state, RunState::Idle | RunState::Running) {
            *self.state = RunState::Failed;
        }
        self.pipeline.teardown();
        tracing::info!(state = %self.state, "run loop finished");
    }
}

/// Drives a [`Pipeline`] and dispatches its bus messages.
pub struct Runloop {
    pipeline: Pipeline,
    state: RunState,
    config: RunloopConfig,
    shutdown: ShutdownHandle,
    metrics: PipelineMetrics,
}

impl Runloop {
    /// Create a run loop with the default configuration.
    pub fn new(pipeline: Pipeline) -> Self {
        Self::with_config(pipeline, RunloopConfig::default())
    }

    /// Create a run loop with a custom configuration.
    pub fn with_config(pipeline: Pipeline, config: RunloopConfig) -> Self {
        let metrics = PipelineMetrics::new(pipeline.name());
        Self {
            pipeline,
            state: RunState::Idle,
            config,
            shutdown: ShutdownHandle::default(),
            metrics,
        }
    }

    /// Also stop gracefully on Ctrl-C.
    pub fn with_ctrl_c(mut self) -> Self {
        self.config.handle_ctrl_c = true;
        self
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The pipeline being driven.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// A handle that stops the loop gracefully.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run with the [`DefaultHandler`].
    pub async fn run(&mut self) -> Result<()> {
        let handler = DefaultHandler::new(self.pipeline.name());
        self.run_with(handler).await
    }

    /// Run, dispatching every bus message to `handler`.
    ///
    /// Returns `Ok` when the loop stopped cleanly, the error the handler
    /// failed the loop with, or the error the handler returned. A run loop
    /// runs at most once.
    pub async fn run_with<H: BusHandler>(&mut self, handler: H) -> Result<()> {
        let span = span_pipeline(self.pipeline.name());
        self.dispatch(handler).instrument(span).await
    }

    /// [`run`](Self::run) on a dedicated current-thread runtime.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(&mut self) -> Result<()> {
        let handler = DefaultHandler::new(self.pipeline.name());
        self.run_blocking_with(handler)
    }

    /// [`run_with`](Self::run_with) on a dedicated current-thread runtime.
    pub fn run_blocking_with<H: BusHandler>(&mut self, handler: H) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run_with(handler))
    }

    async fn dispatch<H: BusHandler>(&mut self, mut handler: H) -> Result<()> {
        if self.state != RunState::Idle {
            return Err(Error::Configuration(format!(
                "run loop of '{}' already ran ({})",
                self.pipeline.name(),
                self.state
            )));
        }

        let Self {
            pipeline,
            state,
            config,
            shutdown,
            metrics,
        } = self;
        let mut guard = TeardownGuard { pipeline, state };

        if guard.pipeline.is_empty() {
            tracing::info!("empty pipeline, nothing to run");
            *guard.state = RunState::Stopped;
            return Ok(());
        }

        let mut bus = guard.pipeline.take_bus().ok_or_else(|| {
            Error::Configuration("pipeline bus was already taken".to_string())
        })?;
        guard.pipeline.start()?;
        *guard.state = RunState::Running;
        tracing::info!("pipeline running");

        let notify = Arc::clone(&shutdown.notify);
        let shutdown_requested = notify.notified();
        tokio::pin!(shutdown_requested);

        let handle_ctrl_c = config.handle_ctrl_c;
        let ctrl_c = async move {
            if handle_ctrl_c {
                tokio::signal::ctrl_c().await
            } else {
                std::future::pending().await
            }
        };
        tokio::pin!(ctrl_c);

        let outcome = loop {
            tokio::select! {
                message = bus.recv() => {
                    let Some(message) = message else {
                        break Err(Error::Runtime {
                            origin: None,
                            message: "bus closed".to_string(),
                            cause: "every bus sender was dropped while running".to_string(),
                        });
                    };
                    metrics.record_message(message.kind());
                    tracing::debug!(kind = message.kind(), %message, "bus message");

                    let mut control = LoopControl::default();
                    if let Err(e) = handler.handle(&message, &mut control) {
                        break Err(e);
                    }
                    match control.outcome {
                        None => {}
                        Some(Outcome::Quit) => break Ok(()),
                        Some(Outcome::Fail(e)) => break Err(e),
                    }
                }
                _ = &mut shutdown_requested => {
                    tracing::info!("shutdown requested");
                    break Ok(());
                }
                signal = &mut ctrl_c => {
                    break match signal {
                        Ok(()) => {
                            tracing::info!("interrupted");
                            Ok(())
                        }
                        Err(e) => Err(Error::Io(e)),
                    };
                }
            }
        };

        *guard.state = if outcome.is_ok() {
            RunState::Stopped
        } else {
            RunState::Failed
        };
        drop(guard);
        outcome
    }
}

impl fmt::Debug for Runloop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runloop")
            .field("pipeline", &self.pipeline)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}
