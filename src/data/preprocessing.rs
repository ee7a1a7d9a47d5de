use burn::prelude::*;

/// One-hot encode `[N, H, W, 1]` class indices into `[N, H, W, K]`.
///
/// Indices outside `0..n_classes` produce all-zero rows.
pub fn one_hot<B: Backend>(labels: Tensor<B, 4, Int>, n_classes: usize) -> Tensor<B, 4> {
    let [n, h, w, c] = labels.dims();
    assert_eq!(c, 1, "labels must have a trailing dimension of 1, got {c}");

    let classes = Tensor::<B, 1, Int>::arange(0..n_classes as i64, &labels.device())
        .reshape([1, 1, 1, n_classes])
        .repeat_dim(0, n)
        .repeat_dim(1, h)
        .repeat_dim(2, w);

    labels.repeat_dim(3, n_classes).equal(classes).float()
}

/// Turns raw channel-last tiles into model inputs and one-hot targets.
#[derive(Debug, Clone, Copy)]
pub struct DatasetPreprocessing {
    pub n_classes: usize,
}

impl DatasetPreprocessing {
    pub fn new(n_classes: usize) -> Self {
        Self { n_classes }
    }

    /// `inputs [N, P, P, C]` and `labels [N, Pl, Pl, 1]` to
    /// `[N, C, P, P]` and `[N, K, Pl, Pl]`.
    pub fn apply<B: Backend>(
        &self,
        inputs: Tensor<B, 4>,
        labels: Tensor<B, 4, Int>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let targets = one_hot(labels, self.n_classes).permute([0, 3, 1, 2]);
        (inputs.permute([0, 3, 1, 2]), targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn labels(values: Vec<i64>, shape: [usize; 4]) -> Tensor<TestBackend, 4, Int> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_one_hot_argmax_gives_back_labels() {
        let values = vec![0, 5, 2, 3, 1, 4];
        let encoded = one_hot(labels(values.clone(), [1, 2, 3, 1]), 6);
        assert_eq!(encoded.dims(), [1, 2, 3, 6]);

        let sums: Vec<f32> = encoded.clone().sum_dim(3).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|&s| s == 1.0));

        let decoded: Vec<i64> = encoded
            .argmax(3)
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_out_of_range_label_is_all_zero() {
        let encoded = one_hot(labels(vec![7, 1], [1, 1, 2, 1]), 6);
        let rows: Vec<f32> = encoded.into_data().to_vec().unwrap();
        assert!(rows[..6].iter().all(|&v| v == 0.0));
        assert_eq!(&rows[6..], &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_preprocessing_moves_channels_first() {
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 4>::zeros([2, 8, 8, 4], &device);
        let (x, y) = DatasetPreprocessing::new(6).apply(inputs, labels(vec![1; 2 * 8 * 8], [2, 8, 8, 1]));
        assert_eq!(x.dims(), [2, 4, 8, 8]);
        assert_eq!(y.dims(), [2, 6, 8, 8]);
    }
}
