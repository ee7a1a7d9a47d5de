use anyhow::{bail, Result};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

use super::blocks::{Cropping2d, Normalize, ValidConv, ValidTransposedConv, REFLECTANCE_SCALE};
use super::stage::{mirror_decoder, total_shrink, validate_stages, StageSpec};
use super::summary::{conv_params, LayerSummary};
use super::PixelClassifier;

/// Number of land cover classes of the FCNN example.
pub const N_CLASSES: usize = 6;

/// Pixels discarded on each side of the softmax map.
pub const DEFAULT_CROP_MARGIN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcnnConfig {
    pub input_channels: usize,
    pub n_classes: usize,
    pub encoder: Vec<StageSpec>,
    pub crop_margin: usize,
    pub input_scale: f32,
}

impl Default for FcnnConfig {
    fn default() -> Self {
        Self {
            input_channels: 4,
            n_classes: N_CLASSES,
            encoder: vec![
                StageSpec::relu(3, 16),
                StageSpec::relu(3, 32),
                StageSpec::relu(3, 64),
                StageSpec::relu(3, 64),
            ],
            crop_margin: DEFAULT_CROP_MARGIN,
            input_scale: REFLECTANCE_SCALE,
        }
    }
}

impl FcnnConfig {
    pub fn validate(&self) -> Result<()> {
        validate_stages(&self.encoder)?;
        if self.input_channels == 0 {
            bail!("input_channels must be positive");
        }
        if self.n_classes == 0 {
            bail!("n_classes must be positive");
        }
        if self.input_scale == 0.0 {
            bail!("input_scale must be non-zero");
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FcnnModel<B>> {
        self.validate()?;

        let mut encoder = Vec::with_capacity(self.encoder.len());
        let mut in_channels = self.input_channels;
        for stage in &self.encoder {
            encoder.push(ValidConv::new(
                device,
                in_channels,
                stage.depth,
                stage.kernel_size,
                stage.activation.is_relu(),
            ));
            in_channels = stage.depth;
        }

        let decoder = mirror_decoder(&self.encoder, self.n_classes)
            .into_iter()
            .map(|stage| {
                let tconv = ValidTransposedConv::new(
                    device,
                    in_channels,
                    stage.depth,
                    stage.kernel_size,
                    stage.activation.is_relu(),
                );
                in_channels = stage.depth;
                tconv
            })
            .collect();

        log::debug!(
            "FCNN init: {} channels in, {} classes out, {} stages, crop {}",
            self.input_channels,
            self.n_classes,
            self.encoder.len(),
            self.crop_margin
        );

        Ok(FcnnModel {
            normalize: Normalize::new(self.input_scale),
            encoder,
            decoder,
            crop: Cropping2d::new(self.crop_margin),
            encoder_shrink: total_shrink(&self.encoder),
            n_classes: self.n_classes,
        })
    }

    /// Output side length for a given input side, `None` if nothing is left after cropping.
    pub fn output_size(&self, input_size: usize) -> Option<usize> {
        if input_size <= total_shrink(&self.encoder) {
            return None;
        }
        input_size
            .checked_sub(2 * self.crop_margin)
            .filter(|&size| size > 0)
    }

    /// Layer table for a square input patch, in graph order.
    pub fn summary(&self, input_size: usize) -> Vec<LayerSummary> {
        let mut layers = vec![LayerSummary::new(
            "input_xs",
            [input_size, input_size, self.input_channels],
            0,
        )];

        let mut size = input_size;
        let mut channels = self.input_channels;
        for (i, stage) in self.encoder.iter().enumerate() {
            size = size.saturating_sub(stage.kernel_size - 1);
            layers.push(LayerSummary::new(
                format!("conv{}", i + 1),
                [size, size, stage.depth],
                conv_params(stage.kernel_size, channels, stage.depth),
            ));
            channels = stage.depth;
        }

        for (i, stage) in mirror_decoder(&self.encoder, self.n_classes).iter().enumerate() {
            size += stage.kernel_size - 1;
            let name = if stage.skip_from.is_some() {
                format!("tconv{}", i + 1)
            } else {
                "classifier".to_string()
            };
            layers.push(LayerSummary::new(
                name,
                [size, size, stage.depth],
                conv_params(stage.kernel_size, channels, stage.depth),
            ));
            channels = stage.depth;
        }

        let out = size.saturating_sub(2 * self.crop_margin);
        layers.push(LayerSummary::new(
            "predictions_softmax_tensor",
            [out, out, self.n_classes],
            0,
        ));
        layers
    }
}

/// Small U-Net like fully convolutional network.
///
/// `[N, C, H, W]` raw reflectances in, `[N, n_classes, H - 2m, W - 2m]` class
/// probabilities out, where `m` is the crop margin.
#[derive(Module, Debug)]
pub struct FcnnModel<B: Backend> {
    normalize: Normalize,
    encoder: Vec<ValidConv<B>>,
    decoder: Vec<ValidTransposedConv<B>>,
    crop: Cropping2d,
    encoder_shrink: usize,
    n_classes: usize,
}

impl<B: Backend> FcnnModel<B> {
    pub fn forward(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        self.crop.forward(softmax(self.logits(inputs), 1))
    }

    /// Classifier output before softmax and cropping, same spatial size as the input.
    pub fn logits(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        let n = self.encoder.len();
        let mut x = self.normalize.forward(inputs);

        let mut encoded = Vec::with_capacity(n);
        for conv in &self.encoder {
            x = conv.forward(x);
            encoded.push(x.clone());
        }

        for (i, tconv) in self.decoder.iter().enumerate() {
            x = tconv.forward(x);
            if i + 1 < n {
                x = x + encoded[n - 2 - i].clone();
            }
        }
        x
    }

    pub fn crop_margin(&self) -> usize {
        self.crop.margin()
    }
}

impl<B: Backend> PixelClassifier<B> for FcnnModel<B> {
    fn class_probabilities(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(inputs)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn output_size(&self, input_size: usize) -> Option<usize> {
        if input_size <= self.encoder_shrink {
            return None;
        }
        self.crop.output_size(input_size)
    }
}
