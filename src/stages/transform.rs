//! Black-box transform over labeled tensors.
//!
//! The pipeline treats a [`TransformChain`] like any other filter stage. Its
//! transform is applied per buffer to the tensors named by the chain's input
//! labels; what the transform does is opaque here.

use crate::error::{Error, Result};
use crate::runtime::{NativeRuntime, UnitRef, make_unit};
use crate::stage::{Stage, StageRole, ensure_uninitialized, generate_name};
use std::collections::BTreeMap;
use std::fmt;

/// A dense `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::Transform(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Tensor of zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Apply `f` to every element.
    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        self.data.iter_mut().for_each(|x| *x = f(*x));
        self
    }
}

/// Tensors keyed by label.
pub type LabeledTensors = BTreeMap<String, Tensor>;

type TransformFn = dyn Fn(LabeledTensors) -> Result<LabeledTensors> + Send + Sync;

/// Applies an opaque transform to labeled tensors.
pub struct TransformChain {
    name: String,
    input_labels: Vec<String>,
    transform: Box<TransformFn>,
    units: Vec<UnitRef>,
}

impl TransformChain {
    /// Native kind of the unit the transform is attached to.
    pub const KIND: &'static str = "queue";

    /// Create a chain reading `input_labels`.
    pub fn new<I, S, F>(input_labels: I, transform: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(LabeledTensors) -> Result<LabeledTensors> + Send + Sync + 'static,
    {
        Self {
            name: format!("{}-transform", generate_name()),
            input_labels: input_labels.into_iter().map(Into::into).collect(),
            transform: Box::new(transform),
            units: Vec::new(),
        }
    }

    /// Replace the generated base name.
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = format!("{}-transform", name.as_ref());
        self
    }

    /// Labels the transform reads.
    pub fn input_labels(&self) -> &[String] {
        &self.input_labels
    }

    /// Run the transform on one buffer's tensors.
    ///
    /// Only the declared input labels are passed on; a missing label is an
    /// error.
    pub fn apply(&self, mut tensors: LabeledTensors) -> Result<LabeledTensors> {
        let mut inputs = LabeledTensors::new();
        for label in &self.input_labels {
            let tensor = tensors
                .remove(label)
                .ok_or_else(|| Error::Transform(format!("missing input '{label}'")))?;
            inputs.insert(label.clone(), tensor);
        }
        (self.transform)(inputs)
    }
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChain")
            .field("name", &self.name)
            .field("input_labels", &self.input_labels)
            .field("units", &self.units.len())
            .finish()
    }
}

impl Stage for TransformChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        StageRole::Filter
    }

    fn initialize(&mut self, runtime: &dyn NativeRuntime) -> Result<()> {
        ensure_uninitialized(&self.name, &self.units)?;
        let unit = make_unit(runtime, &self.name, Self::KIND, &self.name)?;
        unit.set_property("input-labels", self.input_labels.join(",").into())?;
        self.units.push(unit);
        Ok(())
    }

    fn units(&self) -> &[UnitRef] {
        &self.units
    }
}
