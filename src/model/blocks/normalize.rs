use burn::prelude::*;

/// Default divisor for 12-bit multispectral reflectances in `[0, 10000]`.
pub const REFLECTANCE_SCALE: f32 = 10_000.0;

/// Linear stretch of raw reflectance values to roughly `[0, 1]`.
///
/// Lives inside the model so training and inference see the same inputs.
#[derive(Module, Debug, Clone)]
pub struct Normalize {
    scale: f32,
}

impl Normalize {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x / self.scale
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::new(REFLECTANCE_SCALE)
    }
}
