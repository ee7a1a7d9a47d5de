use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::prelude::*;
use burn::tensor::activation;

/// Valid-mode transposed convolution: grows each spatial side by `kernel_size - 1`.
#[derive(Module, Debug)]
pub struct ValidTransposedConv<B: Backend> {
    tconv: ConvTranspose2d<B>,
    relu: bool,
}

impl<B: Backend> ValidTransposedConv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        relu: bool,
    ) -> Self {
        Self {
            tconv: ConvTranspose2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .init(device),
            relu,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.tconv.forward(x);
        if self.relu {
            activation::relu(x)
        } else {
            x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_transposed_conv_restores_extent() {
        let device = Default::default();
        let tconv = ValidTransposedConv::<TestBackend>::new(&device, 64, 32, 3, true);
        let x = Tensor::<TestBackend, 4>::zeros([1, 64, 10, 12], &device);
        assert_eq!(tconv.forward(x).dims(), [1, 32, 12, 14]);
    }
}
