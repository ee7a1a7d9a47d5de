use crate::bundle::{self, BundleConfig};
use crate::data::{DatasetPreprocessing, PatchLoader, PatchesImagesDataset};
use crate::model::blocks::center_crop_to;
use crate::model::{CategoricalCrossEntropy, PatchModel, PixelClassifier};
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::training::metrics::{ConfusionMatrix, EvaluationMetrics, PrecisionRecall};
use crate::training::TrainingConfig;
use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::Optimizer;
use burn::optim::{Adam, AdamConfig, GradientsParams};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;

pub struct Trainer<B: AutodiffBackend> {
    pub model: PatchModel<B>,
    loss_fn: CategoricalCrossEntropy,
    config: TrainingConfig,
    device: B::Device,
    optimizer: OptimizerAdaptor<Adam, PatchModel<B>, B>,
    history: TrainingHistory,
}

/// Adam with a fixed learning rate and the 1e-7 epsilon of the reference optimizer.
pub fn adam_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(ADAM_EPSILON)
}

pub const ADAM_EPSILON: f32 = 1e-7;

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        let model = config.model.init::<B>(&device)?;
        Ok(Self::with_model(model, config, device, TrainingHistory::new()))
    }

    /// Continue from the weights and history of an existing bundle.
    ///
    /// The bundle's architecture replaces the one in `config`.
    pub fn restore_from(
        mut config: TrainingConfig,
        dir: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        let (model, saved) = bundle::load::<B>(dir.as_ref(), &device)?;
        let history = bundle::load_history(dir.as_ref())?;
        if saved.model != config.model {
            log::warn!(
                "Restoring a {} model, ignoring the configured {} architecture",
                saved.model.name(),
                config.model.name()
            );
        }
        config.model = saved.model;
        Ok(Self::with_model(model, config, device, history))
    }

    fn with_model(
        model: PatchModel<B>,
        config: TrainingConfig,
        device: B::Device,
        history: TrainingHistory,
    ) -> Self {
        let optimizer = adam_config().init();
        Self {
            model,
            loss_fn: CategoricalCrossEntropy::new(),
            config,
            device,
            optimizer,
            history,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Check that a dataset fits the model: bands, and a label patch at least
    /// as large as the prediction map.
    pub fn check_dataset(&self, dataset: &PatchesImagesDataset) -> Result<()> {
        let arch = &self.config.model;
        if dataset.input_bands() != arch.input_channels() {
            bail!(
                "patches have {} bands, the {} model expects {}",
                dataset.input_bands(),
                arch.name(),
                arch.input_channels()
            );
        }
        match arch.output_size(dataset.input_patch_size()) {
            Some(out) if out <= dataset.label_patch_size() => Ok(()),
            Some(out) => bail!(
                "{}px label patches are smaller than the {}px prediction",
                dataset.label_patch_size(),
                out
            ),
            None => bail!(
                "{}px input patches are too small for the {} model",
                dataset.input_patch_size(),
                arch.name()
            ),
        }
    }

    pub fn fit(
        &mut self,
        train: &PatchesImagesDataset,
        valid: &PatchesImagesDataset,
    ) -> Result<&TrainingHistory> {
        self.check_dataset(train)?;
        self.check_dataset(valid)?;

        log::info!("Dataset loaded:");
        log::info!("  Train: {} patches", train.len());
        log::info!("  Valid: {} patches", valid.len());

        let pb = ProgressBar::new(self.config.nb_epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
        );

        let first_epoch = self.history.epochs.last().map_or(1, |r| r.epoch + 1);
        for step in 1..=self.config.nb_epochs {
            let epoch = first_epoch + step - 1;
            let epoch_start = Instant::now();

            let train_loss = self.train_epoch(train)?;

            let validation = if self.config.validates_after(step) {
                let metrics = self.evaluate(valid)?;
                metrics.report.log(&format!("Validation after epoch {epoch}"));
                Some(metrics)
            } else {
                None
            };

            match &validation {
                Some(v) => pb.set_message(format!(
                    "Epoch {}: Train={:.4}, Val={:.4}, P={:.3}, R={:.3}",
                    epoch, train_loss, v.loss, v.precision, v.recall
                )),
                None => pb.set_message(format!("Epoch {}: Train={:.4}", epoch, train_loss)),
            }
            pb.inc(1);

            self.history.push_epoch(EpochRecord {
                epoch,
                train_loss,
                validation,
            });
            log::debug!("Epoch time: {:.2}s", epoch_start.elapsed().as_secs_f32());
        }

        pb.finish_with_message("Training completed!");
        Ok(&self.history)
    }

    /// One pass over `dataset`, returns the mean batch loss.
    pub fn train_epoch(&mut self, dataset: &PatchesImagesDataset) -> Result<f64> {
        let dataloader: PatchLoader<B> = PatchLoader::new(
            dataset,
            DatasetPreprocessing::new(self.model.n_classes()),
            self.config.batch_size,
            self.config.shuffle,
            self.device.clone(),
        );

        let mut total_loss = 0.0;
        let mut count = 0;

        for (batch_idx, batch) in dataloader.enumerate() {
            let batch = batch?;
            let probabilities = self.model.class_probabilities(batch.inputs);
            let [_, _, h, w] = probabilities.dims();
            let targets = center_crop_to(batch.targets, h, w);

            let loss = self.loss_fn.forward(probabilities, targets);
            let loss_value = loss.clone().into_scalar().elem::<f64>();

            if !loss_value.is_finite() {
                log::warn!("NaN/Inf loss at batch {}, skipped", batch_idx + 1);
                continue;
            }

            total_loss += loss_value;
            count += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            if (batch_idx + 1) % 10 == 0 {
                log::debug!("Batch {}: loss={:.4}", batch_idx + 1, loss_value);
            }
        }

        Ok(if count > 0 { total_loss / count as f64 } else { 0.0 })
    }

    /// Loss, precision, recall and confusion-matrix scores on `dataset`.
    pub fn evaluate(&self, dataset: &PatchesImagesDataset) -> Result<EvaluationMetrics> {
        self.check_dataset(dataset)?;
        let device = <B::InnerBackend as Backend>::Device::default();
        evaluate_model(
            &self.model.valid(),
            dataset,
            self.config.batch_size,
            &self.loss_fn,
            &device,
        )
    }

    /// Write the model bundle to `model_dir`.
    pub fn save(&self) -> Result<()> {
        let config = BundleConfig::new(self.config.model.clone(), self.history.epochs.len());
        bundle::save(&self.config.model_dir, &self.model, &config, &self.history)
    }

    /// Evaluate on a held-out set and keep the result in the history.
    pub fn test(&mut self, dataset: &PatchesImagesDataset) -> Result<&EvaluationMetrics> {
        let metrics = self.evaluate(dataset)?;
        metrics.report.log("Test");
        Ok(self.history.test.insert(metrics))
    }
}

pub fn evaluate_model<B: Backend>(
    model: &PatchModel<B>,
    dataset: &PatchesImagesDataset,
    batch_size: usize,
    loss_fn: &CategoricalCrossEntropy,
    device: &B::Device,
) -> Result<EvaluationMetrics> {
    let n_classes = model.n_classes();
    let dataloader: PatchLoader<B> = PatchLoader::new(
        dataset,
        DatasetPreprocessing::new(n_classes),
        batch_size,
        false,
        device.clone(),
    );

    let mut precision_recall = PrecisionRecall::new();
    let mut confusion = ConfusionMatrix::new(n_classes);
    let mut total_loss = 0.0;
    let mut count = 0;

    for batch in dataloader {
        let batch = batch?;
        let probabilities = model.class_probabilities(batch.inputs);
        let [_, _, h, w] = probabilities.dims();
        let targets = center_crop_to(batch.targets, h, w);

        let loss = loss_fn
            .forward(probabilities.clone(), targets.clone())
            .into_scalar()
            .elem::<f64>();
        if loss.is_finite() {
            total_loss += loss;
            count += 1;
        }

        precision_recall.update(probabilities.clone(), targets.clone());
        confusion.update(probabilities, targets);
    }

    Ok(EvaluationMetrics {
        loss: if count > 0 { total_loss / count as f64 } else { 0.0 },
        precision: precision_recall.precision(),
        recall: precision_recall.recall(),
        report: confusion.report(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PatchesImage;
    use crate::model::{Architecture, ClassifierConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    /// Class 0 patches are dark, class 1 bright.
    fn two_class_dataset(n: usize) -> PatchesImagesDataset {
        let xs: Vec<Vec<f32>> = (0..n)
            .map(|i| vec![if i % 2 == 0 { 500.0 } else { 9000.0 }; 16 * 16 * 4])
            .collect();
        let ys: Vec<Vec<f32>> = (0..n).map(|i| vec![(i % 2) as f32]).collect();
        let x = PatchesImage::from_raster("xs_1.tif", PatchesImage::stack(16, 4, &xs).unwrap()).unwrap();
        let y = PatchesImage::from_raster("labels_1.tif", PatchesImage::stack(1, 1, &ys).unwrap()).unwrap();
        PatchesImagesDataset::from_images(vec![x], vec![y]).unwrap()
    }

    fn config(dir: &Path, nb_epochs: usize) -> TrainingConfig {
        TrainingConfig {
            model: Architecture::Classifier(ClassifierConfig {
                n_classes: 2,
                ..Default::default()
            }),
            batch_size: 4,
            learning_rate: 0.01,
            nb_epochs,
            validation_step: 2,
            model_dir: dir.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_records_history_and_validates_on_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let data = two_class_dataset(8);
        let mut trainer = Trainer::<TestBackend>::new(config(dir.path(), 3), Default::default()).unwrap();

        let history = trainer.fit(&data, &data).unwrap();
        assert_eq!(history.epochs.len(), 3);
        let validated: Vec<usize> = history
            .epochs
            .iter()
            .filter(|r| r.validation.is_some())
            .map(|r| r.epoch)
            .collect();
        assert_eq!(validated, vec![2, 3]);
        assert!(history.epochs.iter().all(|r| r.train_loss.is_finite()));
    }

    #[test]
    fn test_training_reduces_loss() {
        let dir = tempfile::tempdir().unwrap();
        let data = two_class_dataset(8);
        let mut trainer = Trainer::<TestBackend>::new(config(dir.path(), 1), Default::default()).unwrap();

        let before = trainer.evaluate(&data).unwrap().loss;
        for _ in 0..30 {
            trainer.train_epoch(&data).unwrap();
        }
        let after = trainer.evaluate(&data).unwrap();
        assert!(after.loss < before, "loss {} -> {}", before, after.loss);
    }

    #[test]
    fn test_save_then_restore_continues_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let data = two_class_dataset(4);
        let mut trainer = Trainer::<TestBackend>::new(config(dir.path(), 2), Default::default()).unwrap();
        trainer.fit(&data, &data).unwrap();
        trainer.test(&data).unwrap();
        trainer.save().unwrap();

        let saved = bundle::load_config(dir.path()).unwrap();
        assert_eq!(saved.epochs, 2);
        assert!(bundle::load_history(dir.path()).unwrap().test.is_some());

        let mut restored = Trainer::<TestBackend>::restore_from(config(dir.path(), 1), dir.path(), Default::default()).unwrap();
        let history = restored.fit(&data, &data).unwrap();
        assert_eq!(history.epochs.last().map(|r| r.epoch), Some(3));
    }

    #[test]
    fn test_adam_epsilon() {
        let config = serde_json::to_value(adam_config()).unwrap();
        let epsilon = config["epsilon"].as_f64().unwrap();
        assert!((epsilon - 1e-7).abs() < 1e-12);
    }

    #[test]
    fn test_band_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1);
        cfg.model = Architecture::Classifier(ClassifierConfig {
            input_channels: 3,
            n_classes: 2,
            ..Default::default()
        });
        let trainer = Trainer::<TestBackend>::new(cfg, Default::default()).unwrap();
        assert!(trainer.check_dataset(&two_class_dataset(2)).is_err());
    }
}
