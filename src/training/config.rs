use serde::{Deserialize, Serialize};

use crate::model::{Architecture, FcnnConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Model
    pub model: Architecture,

    // Training
    pub batch_size: usize,
    pub learning_rate: f64,
    pub nb_epochs: usize,
    pub shuffle: bool,

    // Validation every N epochs, and always after the last one
    pub validation_step: usize,

    // Output bundle
    pub model_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model: Architecture::Fcnn(FcnnConfig::default()),
            batch_size: 8,
            learning_rate: 0.0002,
            nb_epochs: 100,
            shuffle: true,
            validation_step: 1,
            model_dir: "runs/model".to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn from_yaml(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainingConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Whether validation runs after `epoch` (1-based).
    pub fn validates_after(&self, epoch: usize) -> bool {
        epoch == self.nb_epochs || (self.validation_step > 0 && epoch % self.validation_step == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassifierConfig;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.learning_rate, 0.0002);
        assert_eq!(config.nb_epochs, 100);
        assert_eq!(config.model.name(), "fcnn");
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.yaml");
        let path = path.to_str().unwrap();

        let config = TrainingConfig {
            model: Architecture::Classifier(ClassifierConfig::default()),
            nb_epochs: 3,
            ..Default::default()
        };
        config.save(path).unwrap();
        assert_eq!(TrainingConfig::from_yaml(path).unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: TrainingConfig = serde_yaml::from_str("nb_epochs: 5\nbatch_size: 2\n").unwrap();
        assert_eq!(config.nb_epochs, 5);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.learning_rate, 0.0002);
    }

    #[test]
    fn test_validation_schedule() {
        let config = TrainingConfig {
            nb_epochs: 7,
            validation_step: 3,
            ..Default::default()
        };
        let epochs: Vec<usize> = (1..=7).filter(|&e| config.validates_after(e)).collect();
        assert_eq!(epochs, vec![3, 6, 7]);
    }
}
