//! Saved model directory: weights, architecture and training history.
//!
//! ```text
//! model_dir/
//! ├── model.mpk      named MessagePack weights
//! ├── config.json    architecture and run metadata
//! └── history.json   per-epoch metrics
//! ```

use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model::{Architecture, PatchModel};
use crate::training::history::TrainingHistory;

pub const WEIGHTS_STEM: &str = "model";
pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub model: Architecture,
    pub n_classes: usize,
    pub input_channels: usize,
    pub epochs: usize,
    /// RFC 3339 UTC timestamp.
    pub trained_at: String,
}

impl BundleConfig {
    pub fn new(model: Architecture, epochs: usize) -> Self {
        Self {
            n_classes: model.n_classes(),
            input_channels: model.input_channels(),
            model,
            epochs,
            trained_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn save<B: Backend>(
    dir: impl AsRef<Path>,
    model: &PatchModel<B>,
    config: &BundleConfig,
    history: &TrainingHistory,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &recorder)
        .map_err(|e| anyhow!("failed to save weights: {e:?}"))?;

    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(config)?)?;
    std::fs::write(dir.join(HISTORY_FILE), serde_json::to_string_pretty(history)?)?;

    log::info!("Model saved to {}", dir.display());
    Ok(())
}

pub fn load_config(dir: impl AsRef<Path>) -> Result<BundleConfig> {
    let path = dir.as_ref().join(CONFIG_FILE);
    let content = std::fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

/// History of the run that produced the bundle, empty if none was written.
pub fn load_history(dir: impl AsRef<Path>) -> Result<TrainingHistory> {
    let path = dir.as_ref().join(HISTORY_FILE);
    if !path.exists() {
        return Ok(TrainingHistory::new());
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

pub fn load<B: Backend>(dir: impl AsRef<Path>, device: &B::Device) -> Result<(PatchModel<B>, BundleConfig)> {
    let dir = dir.as_ref();
    let config = load_config(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = config
        .model
        .init::<B>(device)?
        .load_file(dir.join(WEIGHTS_STEM), &recorder, device)
        .map_err(|e| anyhow!("failed to load weights from {}: {e:?}", dir.display()))?;

    log::info!(
        "Loaded {} model ({} classes) from {}",
        config.model.name(),
        config.n_classes,
        dir.display()
    );
    Ok((model, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifierConfig, PixelClassifier};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_saved_bundle_reproduces_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let arch = Architecture::Classifier(ClassifierConfig::default());
        let model = arch.init::<TestBackend>(&device).unwrap();

        save(dir.path(), &model, &BundleConfig::new(arch.clone(), 3), &TrainingHistory::new()).unwrap();
        assert!(dir.path().join("model.mpk").exists());
        assert!(dir.path().join(CONFIG_FILE).exists());

        let (loaded, config) = load::<TestBackend>(dir.path(), &device).unwrap();
        assert_eq!(config.model, arch);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.n_classes, 8);

        let x = Tensor::<TestBackend, 4>::random([1, 4, 20, 20], Distribution::Uniform(0.0, 3000.0), &device);
        let expected: Vec<f32> = model.class_probabilities(x.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.class_probabilities(x).into_data().to_vec().unwrap();
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6);
        }
        assert!(load_history(dir.path()).unwrap().epochs.is_empty());
    }

    #[test]
    fn test_missing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load::<TestBackend>(dir.path(), &Default::default()).is_err());
    }
}
