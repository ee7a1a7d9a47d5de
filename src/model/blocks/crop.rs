use burn::prelude::*;

/// Fixed-margin center crop on the two spatial axes of a `[N, C, H, W]` tensor.
#[derive(Module, Debug, Clone)]
pub struct Cropping2d {
    margin: usize,
}

impl Cropping2d {
    pub fn new(margin: usize) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Side length left after cropping, `None` when nothing would remain.
    pub fn output_size(&self, input_size: usize) -> Option<usize> {
        input_size
            .checked_sub(2 * self.margin)
            .filter(|&size| size > 0)
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let m = self.margin;
        assert!(
            height > 2 * m && width > 2 * m,
            "cannot crop {m} px per side from a {height}x{width} map"
        );
        x.slice([0..batch, 0..channels, m..height - m, m..width - m])
    }
}

/// Center-crop `x` so its spatial size becomes `[height, width]`.
///
/// Used to line label maps up with the (smaller) prediction map.
pub fn center_crop_to<B: Backend>(x: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    let [batch, channels, h, w] = x.dims();
    assert!(
        h >= height && w >= width,
        "cannot crop a {h}x{w} map to {height}x{width}"
    );
    let top = (h - height) / 2;
    let left = (w - width) / 2;
    x.slice([0..batch, 0..channels, top..top + height, left..left + width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_crop_margin() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([1, 6, 80, 70], &device);
        assert_eq!(Cropping2d::new(32).forward(x).dims(), [1, 6, 16, 6]);
    }

    #[test]
    fn test_center_crop_keeps_the_middle() {
        let device = Default::default();
        let values: Vec<f32> = (0..25).map(|v| v as f32).collect();
        let x = Tensor::<TestBackend, 4>::from_data(TensorData::new(values, [1, 1, 5, 5]), &device);
        let cropped = center_crop_to(x, 1, 1);
        assert_eq!(cropped.into_scalar(), 12.0);
    }

    #[test]
    fn test_crop_output_size() {
        let crop = Cropping2d::new(32);
        assert_eq!(crop.output_size(80), Some(16));
        assert_eq!(crop.output_size(65), Some(1));
        assert_eq!(crop.output_size(64), None);
        assert_eq!(crop.output_size(10), None);
    }
}
