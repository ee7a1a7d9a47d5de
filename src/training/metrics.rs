use burn::prelude::*;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};

/// Micro-averaged precision and recall of probability maps against one-hot
/// targets, both thresholded at 0.5.
#[derive(Debug, Clone, Default)]
pub struct PrecisionRecall {
    true_positives: f64,
    false_positives: f64,
    false_negatives: f64,
}

impl PrecisionRecall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<B: Backend>(&mut self, probabilities: Tensor<B, 4>, targets: Tensor<B, 4>) {
        let predicted = probabilities.greater_elem(0.5).float();
        let actual = targets.greater_elem(0.5).float();

        let tp = (predicted.clone() * actual.clone()).sum();
        let fp = (predicted.clone() * actual.clone().neg().add_scalar(1.0)).sum();
        let fn_ = (predicted.neg().add_scalar(1.0) * actual).sum();

        self.true_positives += tp.into_scalar().elem::<f64>();
        self.false_positives += fp.into_scalar().elem::<f64>();
        self.false_negatives += fn_.into_scalar().elem::<f64>();
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Rows are reference classes, columns predicted classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    n_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn add(&mut self, reference: usize, predicted: usize) {
        if reference < self.n_classes && predicted < self.n_classes {
            self.counts[reference * self.n_classes + predicted] += 1;
        }
    }

    pub fn count(&self, reference: usize, predicted: usize) -> u64 {
        self.counts[reference * self.n_classes + predicted]
    }

    /// Accumulate argmax predictions. Pixels with an all-zero target are skipped.
    pub fn update<B: Backend>(&mut self, probabilities: Tensor<B, 4>, targets: Tensor<B, 4>) {
        let predicted = to_indices(probabilities.argmax(1));
        let reference = to_indices(targets.clone().argmax(1));
        let labelled: Vec<f32> = targets
            .sum_dim(1)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap_or_default();

        for ((r, p), weight) in reference.into_iter().zip(predicted).zip(labelled) {
            if weight > 0.0 {
                self.add(r, p);
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn row_sum(&self, class: usize) -> u64 {
        (0..self.n_classes).map(|p| self.count(class, p)).sum()
    }

    fn col_sum(&self, class: usize) -> u64 {
        (0..self.n_classes).map(|r| self.count(r, class)).sum()
    }

    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.count(class, class) as f64, self.col_sum(class) as f64)
    }

    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.count(class, class) as f64, self.row_sum(class) as f64)
    }

    pub fn f_score(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        ratio(2.0 * p * r, p + r)
    }

    pub fn overall_accuracy(&self) -> f64 {
        let trace: u64 = (0..self.n_classes).map(|c| self.count(c, c)).sum();
        ratio(trace as f64, self.total() as f64)
    }

    /// Cohen's kappa.
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let observed = self.overall_accuracy();
        let expected: f64 = (0..self.n_classes)
            .map(|c| self.row_sum(c) as f64 * self.col_sum(c) as f64)
            .sum::<f64>()
            / (total * total);
        if (1.0 - expected).abs() < f64::EPSILON {
            return if observed >= 1.0 { 1.0 } else { 0.0 };
        }
        (observed - expected) / (1.0 - expected)
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport {
            precision: (0..self.n_classes).map(|c| self.precision(c)).collect(),
            recall: (0..self.n_classes).map(|c| self.recall(c)).collect(),
            f_score: (0..self.n_classes).map(|c| self.f_score(c)).collect(),
            kappa: self.kappa(),
            overall_accuracy: self.overall_accuracy(),
        }
    }
}

fn to_indices<B: Backend>(indices: Tensor<B, 4, Int>) -> Vec<usize> {
    indices
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.max(0) as usize)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f_score: Vec<f64>,
    pub kappa: f64,
    pub overall_accuracy: f64,
}

impl ClassificationReport {
    pub fn log(&self, title: &str) {
        log::info!("{title}:");
        for (class, ((p, r), f)) in self
            .precision
            .iter()
            .zip(&self.recall)
            .zip(&self.f_score)
            .enumerate()
        {
            log::info!("  class {class}: precision={p:.4} recall={r:.4} f-score={f:.4}");
        }
        log::info!("  kappa={:.4} overall accuracy={:.4}", self.kappa, self.overall_accuracy);
    }
}

/// Metrics of one pass over a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub loss: f64,
    pub precision: f64,
    pub recall: f64,
    pub report: ClassificationReport,
}
