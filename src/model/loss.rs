use burn::prelude::*;

/// Categorical cross-entropy on probability maps with one-hot targets.
///
/// Summed over the class axis, averaged over batch and pixels.
#[derive(Debug, Clone)]
pub struct CategoricalCrossEntropy {
    epsilon: f32,
}

impl CategoricalCrossEntropy {
    pub fn new() -> Self {
        Self { epsilon: 1e-7 }
    }

    /// `probabilities` and `targets` are both `[N, K, H, W]`.
    pub fn forward<B: Backend>(&self, probabilities: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let pred_dims = probabilities.dims();
        let target_dims = targets.dims();
        assert_eq!(
            pred_dims, target_dims,
            "prediction {pred_dims:?} and target {target_dims:?} shapes differ"
        );

        let log_p = probabilities
            .clamp(self.epsilon, 1.0 - self.epsilon)
            .log();
        (targets * log_p).sum_dim(1).neg().mean()
    }
}

impl Default for CategoricalCrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn map(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_perfect_prediction_has_near_zero_loss() {
        let target = map(vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0], [1, 3, 1, 2]);
        let loss = CategoricalCrossEntropy::new()
            .forward(target.clone(), target)
            .into_scalar();
        assert!(loss < 1e-5);
    }

    #[test]
    fn test_uniform_prediction_costs_ln_k() {
        let probs = map(vec![0.25; 8], [1, 4, 1, 2]);
        let target = map(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0], [1, 4, 1, 2]);
        let loss = CategoricalCrossEntropy::new().forward(probs, target).into_scalar();
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    #[should_panic]
    fn test_shape_mismatch_panics() {
        let probs = map(vec![0.5; 4], [1, 2, 1, 2]);
        let target = map(vec![1.0; 2], [1, 2, 1, 1]);
        let _ = CategoricalCrossEntropy::new().forward(probs, target);
    }
}
