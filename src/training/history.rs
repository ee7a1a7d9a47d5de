use serde::{Deserialize, Serialize};

use super::metrics::EvaluationMetrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    /// Present on the epochs where validation ran.
    pub validation: Option<EvaluationMetrics>,
}

/// Per-epoch metrics of a run, stored as `history.json` in the model bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    pub test: Option<EvaluationMetrics>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_epoch(&mut self, record: EpochRecord) {
        log::debug!("Epoch {} recorded. History len: {}", record.epoch, self.epochs.len() + 1);
        self.epochs.push(record);
    }

    pub fn last_validation(&self) -> Option<&EvaluationMetrics> {
        self.epochs.iter().rev().find_map(|r| r.validation.as_ref())
    }
}
