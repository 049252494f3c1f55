//! Inference server stage.

use crate::error::{Error, Result};
use crate::runtime::{NativeRuntime, UnitRef, make_unit};
use crate::stage::{
    InferenceFilterCapability, Stage, StageRole, ensure_uninitialized, generate_name,
};

/// Inference backend configuration.
///
/// The defaults match a freshly generated server config: latest model
/// version, batch size 1, repository log level 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferServerConfig {
    /// Unique id of this inference component within the pipeline.
    pub unique_id: u32,
    /// Maximum batch size. Overwritten by the builder with the source count.
    pub max_batch_size: usize,
    /// Model name inside the repository.
    pub model_name: String,
    /// Model version, `-1` for the latest.
    pub model_version: i64,
    /// Root directory of the model repository.
    pub model_repo_root: String,
    /// Repository log verbosity.
    pub log_level: u32,
    /// Run inference on this many frames only (`0` = every frame).
    pub interval: u32,
}

impl Default for InferServerConfig {
    fn default() -> Self {
        Self {
            unique_id: 1,
            max_batch_size: 1,
            model_name: String::new(),
            model_version: -1,
            model_repo_root: String::from("/app/models"),
            log_level: 0,
            interval: 0,
        }
    }
}

impl InferServerConfig {
    /// Config for `model_name` in the repository rooted at `repo_root`.
    pub fn new(repo_root: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_repo_root: repo_root.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Pin a model version.
    pub fn with_model_version(mut self, version: i64) -> Self {
        self.model_version = version;
        self
    }

    /// Set the repository log level.
    pub fn with_log_level(mut self, level: u32) -> Self {
        self.log_level = level;
        self
    }

    /// Set the unique id.
    pub fn with_unique_id(mut self, id: u32) -> Self {
        self.unique_id = id;
        self
    }

    /// Check the config before handing it to the runtime.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.is_empty() {
            return Err(Error::validation("model_name", "\"\"", "must not be empty"));
        }
        if self.model_version < -1 {
            return Err(Error::validation(
                "model_version",
                self.model_version,
                "must be -1 (latest) or a version number",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(Error::validation("max_batch_size", 0, "must be >= 1"));
        }
        Ok(())
    }

    /// Render as the text protobuf the inference server reads.
    pub fn to_prototxt(&self) -> String {
        format!(
            "infer_config {{
  unique_id: {unique_id}
  max_batch_size: {max_batch_size}
  backend {{
    trt_is {{
      model_name: \"{model_name}\"
      version: {version}
      model_repo {{
        root: \"{root}\"
        log_level: {log_level}
      }}
    }}
  }}
}}
input_control {{
  interval: {interval}
}}
",
            unique_id = self.unique_id,
            max_batch_size = self.max_batch_size,
            model_name = self.model_name,
            version = self.model_version,
            root = self.model_repo_root,
            log_level = self.log_level,
            interval = self.interval,
        )
    }
}

/// Runs a model over batched frames.
#[derive(Debug)]
pub struct InferServer {
    name: String,
    config: InferServerConfig,
    units: Vec<UnitRef>,
}

impl InferServer {
    /// Native unit kind.
    pub const KIND: &'static str = "nvinferserver";

    /// Create an inference stage.
    pub fn new(config: InferServerConfig) -> Self {
        Self::named(generate_name(), config)
    }

    /// Create an inference stage with an explicit base name.
    pub fn named(name: impl AsRef<str>, config: InferServerConfig) -> Self {
        Self {
            name: format!("{}-{}", name.as_ref(), Self::KIND),
            config,
            units: Vec::new(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &InferServerConfig {
        &self.config
    }

    fn push_config(&self) -> Result<()> {
        if let Some(unit) = self.units.first() {
            unit.set_property("batch-size", self.config.max_batch_size.into())?;
            unit.set_property("config", self.config.to_prototxt().into())?;
        }
        Ok(())
    }
}

impl Stage for InferServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::InferenceFilter
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        self.config.validate()?;
        let unit = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        unit.set_property("unique-id", self.config.unique_id.into())?;
        self.units.push(unit);
        self.push_config()
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }

    fn as_inference_filter(&self) -> Option<&dyn InferenceFilterCapability> {
        Some(self)
    }

    fn as_inference_filter_mut(&mut self) -> Option<&mut dyn InferenceFilterCapability> {
        Some(self)
    }
}

impl InferenceFilterCapability for InferServer {
    fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::validation("batch-size", 0, "must be >= 1"));
        }
        self.config.max_batch_size = batch_size;
        self.push_config()
    }

    fn batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}
