pub mod config;
pub mod history;
pub mod metrics;
pub mod trainer;

pub use config::TrainingConfig;
pub use history::{EpochRecord, TrainingHistory};
pub use metrics::{ClassificationReport, ConfusionMatrix, EvaluationMetrics, PrecisionRecall};
pub use trainer::{evaluate_model, Trainer};
