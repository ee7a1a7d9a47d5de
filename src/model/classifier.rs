use anyhow::{bail, Result};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

use super::blocks::{Normalize, ValidConv, REFLECTANCE_SCALE};
use super::stage::{total_shrink, validate_stages, StageSpec};
use super::summary::{conv_params, LayerSummary};
use super::PixelClassifier;

/// Patch-based CNN classifier: a 16x16 patch collapses to one feature vector,
/// projected to class scores by a 1x1 convolution.
///
/// Being fully convolutional, it also yields dense predictions on larger rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub input_channels: usize,
    pub n_classes: usize,
    pub stages: Vec<StageSpec>,
    pub input_scale: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_channels: 4,
            n_classes: 8,
            stages: vec![
                StageSpec::relu(5, 16), // 12x12x16
                StageSpec::relu(5, 16), // 8x8x16
                StageSpec::relu(5, 32), // 4x4x32
                StageSpec::relu(4, 32), // 1x1x32
            ],
            input_scale: REFLECTANCE_SCALE,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        validate_stages(&self.stages)?;
        if self.input_channels == 0 || self.n_classes == 0 {
            bail!("input_channels and n_classes must be positive");
        }
        if self.input_scale == 0.0 {
            bail!("input_scale must be non-zero");
        }
        Ok(())
    }

    /// Input side length that produces exactly one prediction.
    pub fn patch_size(&self) -> usize {
        total_shrink(&self.stages) + 1
    }

    pub fn output_size(&self, input_size: usize) -> Option<usize> {
        input_size
            .checked_sub(total_shrink(&self.stages))
            .filter(|&size| size > 0)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PatchClassifier<B>> {
        self.validate()?;

        let mut convs = Vec::with_capacity(self.stages.len());
        let mut in_channels = self.input_channels;
        for stage in &self.stages {
            convs.push(ValidConv::new(
                device,
                in_channels,
                stage.depth,
                stage.kernel_size,
                stage.activation.is_relu(),
            ));
            in_channels = stage.depth;
        }

        Ok(PatchClassifier {
            normalize: Normalize::new(self.input_scale),
            convs,
            head: Conv2dConfig::new([in_channels, self.n_classes], [1, 1]).init(device),
            shrink: total_shrink(&self.stages),
            n_classes: self.n_classes,
        })
    }

    pub fn summary(&self, input_size: usize) -> Vec<LayerSummary> {
        let mut layers = vec![LayerSummary::new(
            "x",
            [input_size, input_size, self.input_channels],
            0,
        )];
        let mut size = input_size;
        let mut channels = self.input_channels;
        for (i, stage) in self.stages.iter().enumerate() {
            size = size.saturating_sub(stage.kernel_size - 1);
            let name = if i + 1 == self.stages.len() {
                "features".to_string()
            } else {
                format!("conv{}", i + 1)
            };
            layers.push(LayerSummary::new(
                name,
                [size, size, stage.depth],
                conv_params(stage.kernel_size, channels, stage.depth),
            ));
            channels = stage.depth;
        }
        layers.push(LayerSummary::new(
            "estimated",
            [size, size, self.n_classes],
            conv_params(1, channels, self.n_classes),
        ));
        layers.push(LayerSummary::new("prediction", [size, size, 1], 0));
        layers
    }
}

#[derive(Module, Debug)]
pub struct PatchClassifier<B: Backend> {
    normalize: Normalize,
    convs: Vec<ValidConv<B>>,
    head: Conv2d<B>,
    shrink: usize,
    n_classes: usize,
}

impl<B: Backend> PatchClassifier<B> {
    /// Deep features of the last convolution, `[N, depth, H', W']`.
    pub fn features(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.normalize.forward(inputs);
        for conv in &self.convs {
            x = conv.forward(x);
        }
        x
    }

    /// Class probabilities, `[N, n_classes, H', W']`.
    pub fn forward(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.head.forward(self.features(inputs)), 1)
    }

    /// Most likely class per output pixel, `[N, 1, H', W']`.
    pub fn prediction(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4, Int> {
        self.forward(inputs).argmax(1)
    }
}

impl<B: Backend> PixelClassifier<B> for PatchClassifier<B> {
    fn class_probabilities(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(inputs)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn output_size(&self, input_size: usize) -> Option<usize> {
        input_size.checked_sub(self.shrink).filter(|&size| size > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_patch_collapses_to_single_prediction() {
        let device = Default::default();
        let config = ClassifierConfig::default();
        assert_eq!(config.patch_size(), 16);

        let model = config.init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random([3, 4, 16, 16], Distribution::Uniform(0.0, 3000.0), &device);
        assert_eq!(model.features(x.clone()).dims(), [3, 32, 1, 1]);
        assert_eq!(model.forward(x.clone()).dims(), [3, 8, 1, 1]);
        assert_eq!(model.prediction(x).dims(), [3, 1, 1, 1]);
    }

    #[test]
    fn test_fully_convolutional_on_larger_input() {
        let device = Default::default();
        let config = ClassifierConfig::default();
        let model = config.init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 40, 31], &device);
        assert_eq!(model.forward(x).dims(), [1, 8, 25, 16]);
        assert_eq!(config.output_size(40), Some(25));
        assert_eq!(config.output_size(15), None);
    }

    #[test]
    fn test_predictions_are_valid_class_indices() {
        let device = Default::default();
        let model = ClassifierConfig::default().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random([1, 4, 20, 20], Distribution::Uniform(0.0, 3000.0), &device);
        let labels: Vec<i64> = model
            .prediction(x)
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(labels.len(), 25);
        assert!(labels.iter().all(|&c| (0..8).contains(&c)));
    }

    #[test]
    fn test_summary_params_match_module() {
        let device = Default::default();
        let config = ClassifierConfig::default();
        let model = config.init::<TestBackend>(&device).unwrap();
        let summary = config.summary(16);
        assert_eq!(summary.last().unwrap().output_shape, [1, 1, 1]);
        let total: usize = summary.iter().map(|l| l.params).sum();
        assert_eq!(model.num_params(), total);
    }
}
