//! Integration tests for pipeline composition.

use std::sync::Arc;
use stream_compose::Error;
use stream_compose::format::{FilterProperties, PixelFormat};
use stream_compose::pipeline::{Pipeline, PipelineBuilder};
use stream_compose::runtime::{NativeUnit, UnitState};
use stream_compose::runtime::sim::SimRuntime;
use stream_compose::stage::Stage;
use stream_compose::stages::{
    AggregatedSources, DisplaySink, InferServer, InferServerConfig, NativeStage, StreamMux,
    StreamMuxConfig, TransformChain, UriSource, VideoConvert,
};

const BIN: &str = "cams-sources-bin";
const MUX: &str = "mux-nvstreammux";

fn sources(uris: &[&str]) -> AggregatedSources {
    let sources = uris
        .iter()
        .enumerate()
        .map(|(i, uri)| UriSource::named(format!("cam{i}"), *uri))
        .collect();
    AggregatedSources::named("cams", sources)
}

fn files(n: usize) -> AggregatedSources {
    let uris: Vec<String> = (0..n).map(|i| format!("file:///videos/{i}.mp4")).collect();
    sources(&uris.iter().map(String::as_str).collect::<Vec<_>>())
}

fn mux(n: usize) -> StreamMux {
    StreamMux::named("mux", StreamMuxConfig::new(n).with_resolution(1260, 1024))
}

fn infer() -> InferServer {
    InferServer::named("seg", InferServerConfig::new("/app/models", "monai_unet_trt"))
}

fn builder(runtime: &SimRuntime) -> PipelineBuilder {
    PipelineBuilder::new(Arc::new(runtime.clone())).name("compose-test")
}

fn full_pipeline(runtime: &SimRuntime, n: usize) -> Pipeline {
    let caps = FilterProperties::builder()
        .format(PixelFormat::Rgb)
        .build()
        .unwrap();
    builder(runtime)
        .stage(files(n))
        .stage(mux(n))
        .stage(VideoConvert::named("conv", caps))
        .stage(infer())
        .stage(TransformChain::new(["seg_output"], Ok).with_name("post"))
        .stage(DisplaySink::new(false).with_name("screen"))
        .build()
        .unwrap()
}

fn assert_never_ran(runtime: &SimRuntime) {
    for unit in runtime.units() {
        assert!(!unit.was_in(UnitState::Running), "{} ran", unit.name());
    }
}

/// Every source gets its own multiplexer sink pad, fed from the bin.
#[test]
fn test_fan_in_per_source() {
    for n in [1, 3, 8] {
        let runtime = SimRuntime::new();
        let _pipeline = builder(&runtime)
            .stage(files(n))
            .stage(mux(n))
            .stage(DisplaySink::new(false))
            .build()
            .unwrap();

        let mux_unit = runtime.unit(MUX).unwrap();
        let expected: Vec<String> = (0..n).map(|i| format!("sink_{i}")).collect();
        assert_eq!(mux_unit.requested_pads(), expected);

        let fan_in = runtime.links_into(MUX);
        assert_eq!(fan_in.len(), n);
        for (i, (src, sink)) in fan_in.iter().enumerate() {
            assert_eq!(src.to_string(), format!("{BIN}:src"));
            assert_eq!(sink.name(), format!("sink_{i}"));
        }
    }
}

#[test]
fn test_batch_size_follows_source_count() {
    let runtime = SimRuntime::new();
    let pipeline = full_pipeline(&runtime, 3);

    let batch_size = pipeline
        .stage("seg-nvinferserver")
        .and_then(|stage| stage.as_inference_filter())
        .map(|infer| infer.batch_size());
    assert_eq!(batch_size, Some(3));

    let unit = runtime.unit("seg-nvinferserver").unwrap();
    assert_eq!(unit.property("batch-size").and_then(|v| v.as_u64()), Some(3));
}

#[test]
fn test_liveness_propagates_to_mux() {
    let runtime = SimRuntime::new();
    let _pipeline = builder(&runtime)
        .stage(sources(&["file:///videos/a.mp4", "rtsp://camera/stream"]))
        .stage(mux(2))
        .stage(DisplaySink::new(false))
        .build()
        .unwrap();
    let live = runtime.unit(MUX).unwrap().property("live-source");
    assert_eq!(live.and_then(|v| v.as_bool()), Some(true));

    let runtime = SimRuntime::new();
    let _pipeline = builder(&runtime)
        .stage(files(2))
        .stage(mux(2))
        .stage(DisplaySink::new(false))
        .build()
        .unwrap();
    let live = runtime.unit(MUX).unwrap().property("live-source");
    assert_eq!(live.and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn test_chain_links_in_order() {
    let runtime = SimRuntime::new();
    let pipeline = full_pipeline(&runtime, 2);

    let links: Vec<String> = pipeline
        .links()
        .map(|l| format!("{} -> {}", l.src, l.sink))
        .collect();
    assert_eq!(
        links,
        [
            "cam0-uridecodebin:src -> cams-sources-bin:sink_0",
            "cam1-uridecodebin:src -> cams-sources-bin:sink_1",
            "cams-sources-bin:src -> mux-nvstreammux:sink_0",
            "cams-sources-bin:src -> mux-nvstreammux:sink_1",
            "conv-nvvideoconvert:src -> conv-filter:sink",
            "mux-nvstreammux:src -> conv-nvvideoconvert:sink",
            "conv-filter:src -> seg-nvinferserver:sink",
            "seg-nvinferserver:src -> post-transform:sink",
            "post-transform:src -> screen-nveglglessink:sink",
        ]
    );
    assert_eq!(runtime.links().len(), links.len());
}

#[test]
fn test_caps_reach_filter_unit() {
    let runtime = SimRuntime::new();
    let _pipeline = full_pipeline(&runtime, 1);

    let caps = runtime
        .unit("conv-filter")
        .and_then(|unit| unit.property("caps"))
        .map(|v| v.as_string());
    assert_eq!(
        caps.as_deref(),
        Some("video/x-raw(memory:NVMM),format=RGB")
    );
    let parsed: FilterProperties = caps.unwrap().parse().unwrap();
    assert_eq!(parsed.format(), Some(PixelFormat::Rgb));
}

#[test]
fn test_linear_pipeline_without_aggregator() {
    let runtime = SimRuntime::new();
    let pipeline = builder(&runtime)
        .stage(NativeStage::source("videotestsrc", "src"))
        .stage(NativeStage::filter("queue", "q"))
        .stage(DisplaySink::new(true).with_name("screen"))
        .build()
        .unwrap();

    assert_eq!(pipeline.link_count(), 2);
    assert_eq!(pipeline.downstream("q")[0].name(), "screen-nveglglessink");
}

#[test]
fn test_empty_pipeline() {
    let runtime = SimRuntime::new();
    let pipeline = builder(&runtime).build().unwrap();
    assert!(pipeline.is_empty());
    assert_eq!(pipeline.link_count(), 0);
    assert!(runtime.links().is_empty());
}

#[test]
fn test_mux_batch_size_follows_source_count() {
    let runtime = SimRuntime::new();
    let pipeline = builder(&runtime)
        .stage(files(3))
        .stage(StreamMux::named("mux", StreamMuxConfig::new(1)))
        .stage(DisplaySink::new(false))
        .build()
        .unwrap();

    let mux_unit = runtime.unit(MUX).unwrap();
    assert_eq!(mux_unit.property("batch-size").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(mux_unit.requested_pads(), ["sink_0", "sink_1", "sink_2"]);
    assert_eq!(pipeline.link_count(), 3 + 3 + 1);
}

#[test]
fn test_failed_builds_release_their_bus() {
    let runtime = SimRuntime::new();
    runtime.fail_kind(DisplaySink::KIND);
    for _ in 0..3 {
        let result = builder(&runtime)
            .stage(AggregatedSources::new(vec![UriSource::new("file:///a.mp4")]))
            .stage(StreamMux::new(StreamMuxConfig::new(1)))
            .stage(DisplaySink::new(false))
            .build();
        assert!(matches!(result, Err(Error::StageCreation { .. })));
    }
    assert_eq!(runtime.bus_count(), 0);

    let pipeline = builder(&SimRuntime::new()).build().unwrap();
    assert!(pipeline.bus().is_some());
}

#[test]
fn test_missing_mux_pad() {
    let runtime = SimRuntime::new();
    runtime.remove_pad(MUX, "sink_1");

    let err = builder(&runtime)
        .stage(files(3))
        .stage(mux(3))
        .stage(DisplaySink::new(false))
        .build()
        .unwrap_err();

    match err {
        Error::Link { sink, .. } => assert_eq!(sink, format!("{MUX}:sink_1")),
        other => panic!("expected link error, got {other}"),
    }
    assert_never_ran(&runtime);
    assert!(runtime.units().iter().all(|u| u.state() == UnitState::Null));
}

#[test]
fn test_refused_chain_link() {
    let runtime = SimRuntime::new();
    runtime.refuse_link(MUX, "screen-nveglglessink");

    let err = builder(&runtime)
        .stage(files(1))
        .stage(mux(1))
        .stage(DisplaySink::new(false).with_name("screen"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Link { .. }));
    assert_never_ran(&runtime);
}

#[test]
fn test_second_aggregator_rejected() {
    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(files(1))
        .stage(AggregatedSources::named("more", vec![UriSource::new("file:///b.mp4")]))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_misplaced_mux_rejected() {
    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(mux(1))
        .stage(DisplaySink::new(false))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(files(1))
        .stage(NativeStage::filter("queue", "q"))
        .stage(mux(1))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_never_ran(&runtime);
}

#[test]
fn test_second_mux_rejected() {
    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(files(1))
        .stage(mux(1))
        .stage(StreamMux::named("mux2", StreamMuxConfig::new(1)))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_inference_without_aggregator() {
    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(NativeStage::source("videotestsrc", "src"))
        .stage(infer())
        .stage(DisplaySink::new(false))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_duplicate_names_rejected() {
    let runtime = SimRuntime::new();
    let err = builder(&runtime)
        .stage(NativeStage::source("videotestsrc", "same"))
        .stage(NativeStage::sink("fakesink", "same"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_unit_creation_failure() {
    let runtime = SimRuntime::new();
    runtime.fail_kind(InferServer::KIND);

    let err = builder(&runtime)
        .stage(files(2))
        .stage(mux(2))
        .stage(infer())
        .build()
        .unwrap_err();
    match err {
        Error::StageCreation { stage, kind } => {
            assert_eq!(stage, "seg-nvinferserver");
            assert_eq!(kind, "nvinferserver");
        }
        other => panic!("expected stage creation error, got {other}"),
    }
    assert_never_ran(&runtime);
}

#[test]
fn test_stage_lookup() {
    let runtime = SimRuntime::new();
    let pipeline = full_pipeline(&runtime, 1);

    assert_eq!(pipeline.stages().len(), 6);
    assert!(pipeline.stage("post-transform").is_some());
    assert!(pipeline.stage("missing").is_none());
}

/// The inference batch size always matches the aggregated source count,
/// whatever the caller configured on the stage beforehand.
#[test]
fn test_batch_size_matches_source_count() {
    for n in [1, 2, 5] {
        let runtime = SimRuntime::new();
        let mut config = InferServerConfig::new("/app/models", "seg");
        config.max_batch_size = 7;
        let pipeline = builder(&runtime)
            .stage(files(n))
            .stage(mux(n))
            .stage(InferServer::named("seg", config))
            .build()
            .unwrap();

        let sources = pipeline
            .stage(BIN)
            .and_then(|stage| stage.as_aggregator())
            .map(|agg| agg.num_sources());
        let batch_size = pipeline
            .stage("seg-nvinferserver")
            .and_then(|stage| stage.as_inference_filter())
            .map(|infer| infer.batch_size());
        assert_eq!(sources, Some(n));
        assert_eq!(batch_size, sources);
    }
}
