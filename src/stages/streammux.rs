//! Batching stream multiplexer.

use crate::error::{Error, Result};
use crate::format::{HEIGHT, WIDTH};
use crate::runtime::{NativeRuntime, Pad, UnitRef, make_unit};
use crate::stage::{MultiplexerCapability, Stage, StageRole, ensure_uninitialized, generate_name};

/// Configuration for a [`StreamMux`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMuxConfig {
    /// Number of input streams batched together. Replaced by the
    /// aggregator's source count when the pipeline is built.
    pub num_sources: usize,
    /// Output frame width.
    pub width: u32,
    /// Output frame height.
    pub height: u32,
    /// Time to wait for a complete batch before pushing a partial one.
    pub batched_push_timeout_us: i64,
    /// Whether the inputs are live.
    pub live_source: bool,
}

impl Default for StreamMuxConfig {
    fn default() -> Self {
        Self {
            num_sources: 1,
            width: 1920,
            height: 1080,
            batched_push_timeout_us: 4_000_000,
            live_source: false,
        }
    }
}

impl StreamMuxConfig {
    /// Config batching `num_sources` streams.
    pub fn new(num_sources: usize) -> Self {
        Self {
            num_sources,
            ..Self::default()
        }
    }

    /// Set the output resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the batched push timeout.
    pub fn with_batched_push_timeout_us(mut self, timeout: i64) -> Self {
        self.batched_push_timeout_us = timeout;
        self
    }

    /// Check the config against the runtime's limits.
    pub fn validate(&self) -> Result<()> {
        if self.num_sources == 0 {
            return Err(Error::validation("num_sources", 0, "must be >= 1"));
        }
        WIDTH.check(self.width)?;
        HEIGHT.check(self.height)?;
        if self.batched_push_timeout_us < -1 {
            return Err(Error::validation(
                "batched_push_timeout_us",
                self.batched_push_timeout_us,
                "must be >= -1",
            ));
        }
        Ok(())
    }
}

/// Fans several streams into one batched stream.
#[derive(Debug)]
pub struct StreamMux {
    name: String,
    config: StreamMuxConfig,
    units: Vec<UnitRef>,
}

impl StreamMux {
    /// Native unit kind.
    pub const KIND: &'static str = "nvstreammux";

    /// Create a multiplexer.
    pub fn new(config: StreamMuxConfig) -> Self {
        Self::named(generate_name(), config)
    }

    /// Create a multiplexer with an explicit base name.
    pub fn named(name: impl AsRef<str>, config: StreamMuxConfig) -> Self {
        Self {
            name: format!("{}-{}", name.as_ref(), Self::KIND),
            config,
            units: Vec::new(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &StreamMuxConfig {
        &self.config
    }
}

impl Stage for StreamMux {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Multiplexer
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        self.config.validate()?;

        let unit = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        unit.set_property("width", self.config.width.into())?;
        unit.set_property("height", self.config.height.into())?;
        unit.set_property("batch-size", self.config.num_sources.into())?;
        unit.set_property(
            "batched-push-timeout",
            self.config.batched_push_timeout_us.into(),
        )?;
        unit.set_property("live-source", self.config.live_source.into())?;
        self.units.push(unit);
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }

    fn as_multiplexer_mut(&mut self) -> Option<&mut dyn MultiplexerCapability> {
        Some(self)
    }
}

impl MultiplexerCapability for StreamMux {
    fn set_is_live(&mut self, live: bool) -> Result<()> {
        self.config.live_source = live;
        if let Some(unit) = self.units.first() {
            unit.set_property("live-source", live.into())?;
        }
        Ok(())
    }

    fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::validation("batch-size", 0, "must be >= 1"));
        }
        self.config.num_sources = batch_size;
        if let Some(unit) = self.units.first() {
            unit.set_property("batch-size", batch_size.into())?;
        }
        Ok(())
    }

    fn request_sink_pad(&mut self, index: usize) -> Option<Pad> {
        self.units.first()?.request_pad(&format!("sink_{index}"))
    }
}
