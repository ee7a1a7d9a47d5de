use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation;

/// Valid-mode convolution (no padding, stride 1), optionally followed by ReLU.
///
/// Shrinks each spatial side by `kernel_size - 1`.
#[derive(Module, Debug)]
pub struct ValidConv<B: Backend> {
    conv: Conv2d<B>,
    relu: bool,
}

impl<B: Backend> ValidConv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        relu: bool,
    ) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            relu,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        if self.relu {
            activation::relu(x)
        } else {
            x
        }
    }
}
