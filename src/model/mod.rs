pub mod blocks;
pub mod stage;
pub mod summary;
pub mod fcnn;
pub mod classifier;
pub mod loss;

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub use classifier::{ClassifierConfig, PatchClassifier};
pub use fcnn::{FcnnConfig, FcnnModel, N_CLASSES};
pub use loss::CategoricalCrossEntropy;
pub use stage::{Activation, StageSpec};
pub use summary::{format_summary, LayerSummary};

/// A network mapping `[N, C, H, W]` rasters to `[N, K, H', W']` class probabilities.
pub trait PixelClassifier<B: Backend>: Module<B> {
    fn class_probabilities(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4>;

    fn n_classes(&self) -> usize;

    /// Spatial size of the prediction for an input side of `input_size`, or
    /// `None` when the input is too small to produce any output.
    fn output_size(&self, input_size: usize) -> Option<usize>;
}

/// Architecture description stored next to the weights of a saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "architecture", rename_all = "lowercase")]
pub enum Architecture {
    Fcnn(FcnnConfig),
    Classifier(ClassifierConfig),
}

impl Architecture {
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Fcnn(_) => "fcnn",
            Architecture::Classifier(_) => "classifier",
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Architecture::Fcnn(c) => c.n_classes,
            Architecture::Classifier(c) => c.n_classes,
        }
    }

    pub fn input_channels(&self) -> usize {
        match self {
            Architecture::Fcnn(c) => c.input_channels,
            Architecture::Classifier(c) => c.input_channels,
        }
    }

    pub fn output_size(&self, input_size: usize) -> Option<usize> {
        match self {
            Architecture::Fcnn(c) => c.output_size(input_size),
            Architecture::Classifier(c) => c.output_size(input_size),
        }
    }

    pub fn summary(&self, input_size: usize) -> Vec<LayerSummary> {
        match self {
            Architecture::Fcnn(c) => c.summary(input_size),
            Architecture::Classifier(c) => c.summary(input_size),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Architecture::Fcnn(c) => c.validate(),
            Architecture::Classifier(c) => c.validate(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PatchModel<B>> {
        Ok(match self {
            Architecture::Fcnn(c) => PatchModel::Fcnn(c.init(device)?),
            Architecture::Classifier(c) => PatchModel::Classifier(c.init(device)?),
        })
    }
}

/// Any of the built-in architectures, as stored in a model bundle.
#[derive(Module, Debug)]
pub enum PatchModel<B: Backend> {
    Fcnn(FcnnModel<B>),
    Classifier(PatchClassifier<B>),
}

impl<B: Backend> PixelClassifier<B> for PatchModel<B> {
    fn class_probabilities(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            PatchModel::Fcnn(m) => m.forward(inputs),
            PatchModel::Classifier(m) => m.forward(inputs),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            PatchModel::Fcnn(m) => m.n_classes(),
            PatchModel::Classifier(m) => m.n_classes(),
        }
    }

    fn output_size(&self, input_size: usize) -> Option<usize> {
        match self {
            PatchModel::Fcnn(m) => m.output_size(input_size),
            PatchModel::Classifier(m) => m.output_size(input_size),
        }
    }
}
