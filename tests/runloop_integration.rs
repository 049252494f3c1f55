//! Integration tests for running pipelines and handling bus messages.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stream_compose::pipeline::{
    BusMessage, LoopControl, Pipeline, PipelineBuilder, RunState, Runloop,
};
use stream_compose::runtime::sim::SimRuntime;
use stream_compose::runtime::{NativeUnit, UnitState};
use stream_compose::stages::{
    AggregatedSources, DisplaySink, InferServer, InferServerConfig, NativeStage, StreamMux,
    StreamMuxConfig, UriSource,
};
use stream_compose::{Error, Result};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log sink collecting formatted `tracing` output.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn build(runtime: &SimRuntime) -> Pipeline {
    let sources = AggregatedSources::named(
        "cams",
        vec![
            UriSource::named("cam0", "file:///videos/0.mp4"),
            UriSource::named("cam1", "file:///videos/1.mp4"),
        ],
    );
    PipelineBuilder::new(Arc::new(runtime.clone()))
        .name("run-test")
        .stage(sources)
        .stage(StreamMux::new(StreamMuxConfig::new(2)))
        .stage(InferServer::new(InferServerConfig::new("/app/models", "seg")))
        .stage(DisplaySink::new(true))
        .build()
        .unwrap()
}

fn assert_torn_down_once(runtime: &SimRuntime) {
    let units = runtime.units();
    assert!(!units.is_empty());
    for unit in units {
        assert!(unit.was_in(UnitState::Running), "{} never ran", unit.name());
        assert_eq!(unit.teardown_count(), 1, "{}", unit.name());
        assert_eq!(unit.state(), UnitState::Null);
    }
}

#[tokio::test]
async fn test_eos_stops_cleanly() {
    init_tracing();
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::info("prerolled").with_origin("cams-sources-bin"));
    runtime.post(BusMessage::warning("late buffer").with_debug("qos"));
    runtime.post(BusMessage::eos());

    runloop.run().await.unwrap();
    assert_eq!(runloop.state(), RunState::Stopped);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_error_fails_run() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::error("decode failed", "bad header").with_origin("cam1-uridecodebin"));
    runtime.post(BusMessage::eos());

    let err = runloop.run().await.unwrap_err();
    match err {
        Error::Runtime { origin, message, cause } => {
            assert_eq!(origin.as_deref(), Some("cam1-uridecodebin"));
            assert_eq!(message, "decode failed");
            assert_eq!(cause, "bad header");
        }
        other => panic!("expected runtime error, got {other}"),
    }
    assert_eq!(runloop.state(), RunState::Failed);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_repeated_terminal_messages_tear_down_once() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::eos());
    runtime.post(BusMessage::eos());
    runtime.post(BusMessage::error("late", "after eos"));

    runloop.run().await.unwrap();
    assert_eq!(runloop.state(), RunState::Stopped);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_empty_pipeline_returns_immediately() {
    let runtime = SimRuntime::new();
    let pipeline = PipelineBuilder::new(Arc::new(runtime.clone())).build().unwrap();
    let mut runloop = Runloop::new(pipeline);

    runloop.run().await.unwrap();
    assert_eq!(runloop.state(), RunState::Stopped);
    assert!(runloop.pipeline().is_torn_down());
}

#[tokio::test]
async fn test_custom_handler_sees_every_message() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    for i in 0..3 {
        runtime.post(BusMessage::info(format!("frame {i}")));
    }
    runtime.post(BusMessage::eos());

    let mut seen = Vec::new();
    runloop
        .run_with(|message: &BusMessage, control: &mut LoopControl| -> Result<()> {
            seen.push(message.kind());
            if message.is_terminal() {
                control.quit();
            }
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(seen, ["info", "info", "info", "eos"]);
    assert_eq!(runloop.state(), RunState::Stopped);
}

#[tokio::test]
async fn test_handler_error_propagates_after_teardown() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::warning("disk almost full"));

    let err = runloop
        .run_with(|message: &BusMessage, _: &mut LoopControl| -> Result<()> {
            Err(Error::Configuration(format!("rejected: {message}")))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(ref m) if m.contains("disk almost full")));
    assert_eq!(runloop.state(), RunState::Failed);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_handler_fail() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::warning("overheating").with_origin("gpu"));

    let err = runloop
        .run_with(|message: &BusMessage, control: &mut LoopControl| -> Result<()> {
            if let BusMessage::Warning { message, .. } = message {
                control.fail(Error::Runtime {
                    origin: None,
                    message: message.clone(),
                    cause: "warning escalated".into(),
                });
            }
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("warning escalated"));
    assert_eq!(runloop.state(), RunState::Failed);
}

#[tokio::test]
async fn test_shutdown_from_another_task() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    let handle = runloop.shutdown_handle();

    let stopper = tokio::spawn(async move {
        tokio::task::yield_now().await;
        handle.shutdown();
    });

    runloop.run().await.unwrap();
    stopper.await.unwrap();
    assert_eq!(runloop.state(), RunState::Stopped);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_application_posts_on_bus() {
    let runtime = SimRuntime::new();
    let pipeline = build(&runtime);
    let bus = pipeline.bus().unwrap();
    let mut runloop = Runloop::new(pipeline);

    assert!(bus.post(BusMessage::eos().with_origin("app")));
    runloop.run().await.unwrap();
    assert!(runloop.pipeline().bus().is_none());
}

#[tokio::test]
async fn test_bus_closed_while_running() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.detach_buses();

    assert!(matches!(runloop.run().await, Err(Error::Runtime { .. })));
    assert_eq!(runloop.state(), RunState::Failed);
    assert_torn_down_once(&runtime);
}

#[tokio::test]
async fn test_run_twice_rejected() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::eos());
    runloop.run().await.unwrap();

    assert!(matches!(
        runloop.run().await,
        Err(Error::Configuration(_))
    ));
    assert_torn_down_once(&runtime);
}

#[test]
fn test_run_blocking() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::eos());

    runloop.run_blocking().unwrap();
    assert_eq!(runloop.state(), RunState::Stopped);
    assert_torn_down_once(&runtime);
}

#[test]
fn test_error_cause_is_logged() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(
        BusMessage::error("decode failed", "truncated NAL unit").with_origin("cam0-uridecodebin"),
    );

    let result = tracing::subscriber::with_default(subscriber, || runloop.run_blocking());

    assert!(matches!(result, Err(Error::Runtime { .. })));
    let output = logs.contents();
    assert!(output.contains("ERROR"), "{output}");
    assert!(output.contains("decode failed"), "{output}");
    assert!(output.contains("truncated NAL unit"), "{output}");
    assert!(output.contains("cam0-uridecodebin"), "{output}");
}

#[test]
fn test_warning_detail_is_logged() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .finish();

    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::warning("late buffer").with_debug("qos dropped 3 frames"));
    runtime.post(BusMessage::eos());

    tracing::subscriber::with_default(subscriber, || runloop.run_blocking()).unwrap();

    let output = logs.contents();
    assert!(output.contains("late buffer"), "{output}");
    assert!(output.contains("qos dropped 3 frames"), "{output}");
}

#[test]
fn test_panicking_handler_still_tears_down() {
    let runtime = SimRuntime::new();
    let mut runloop = Runloop::new(build(&runtime));
    runtime.post(BusMessage::info("trigger"));

    let calls = AtomicUsize::new(0);
    let result = catch_unwind(AssertUnwindSafe(|| {
        runloop.run_blocking_with(|_: &BusMessage, _: &mut LoopControl| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            panic!("handler bug");
        })
    }));

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(runloop.state(), RunState::Failed);
    assert_torn_down_once(&runtime);
}

#[test]
fn test_failed_build_never_runs() {
    let runtime = SimRuntime::new();
    runtime.refuse_link("src", "sink");

    let result = PipelineBuilder::new(Arc::new(runtime.clone()))
        .stage(NativeStage::source("videotestsrc", "src"))
        .stage(NativeStage::sink("fakesink", "sink"))
        .build();

    assert!(matches!(result, Err(Error::Link { .. })));
    for unit in runtime.units() {
        assert!(!unit.was_in(UnitState::Running));
        assert_eq!(unit.teardown_count(), 0);
    }
}
