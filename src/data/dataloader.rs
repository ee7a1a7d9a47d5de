use anyhow::Result;
use burn::prelude::*;
use rand::seq::SliceRandom;

use crate::data::dataset::PatchesImagesDataset;
use crate::data::preprocessing::DatasetPreprocessing;

pub struct PatchLoader<'a, B: Backend> {
    dataset: &'a PatchesImagesDataset,
    preprocessing: DatasetPreprocessing,
    batch_size: usize,
    shuffle: bool,
    device: B::Device,
    indices: Vec<usize>,
    current_idx: usize,
}

impl<'a, B: Backend> PatchLoader<'a, B> {
    pub fn new(
        dataset: &'a PatchesImagesDataset,
        preprocessing: DatasetPreprocessing,
        batch_size: usize,
        shuffle: bool,
        device: B::Device,
    ) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();

        if shuffle {
            let mut rng = rand::thread_rng();
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            preprocessing,
            batch_size: batch_size.max(1),
            shuffle,
            device,
            indices,
            current_idx: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            let mut rng = rand::thread_rng();
            self.indices.shuffle(&mut rng);
        }
    }

    /// Number of batches per pass.
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    fn load_batch(&self, batch_indices: &[usize]) -> Result<PatchBatch<B>> {
        let patch = self.dataset.input_patch_size();
        let bands = self.dataset.input_bands();
        let label_patch = self.dataset.label_patch_size();
        let batch_size = batch_indices.len();

        let mut inputs_vec = Vec::with_capacity(batch_size * patch * patch * bands);
        let mut labels_vec = Vec::with_capacity(batch_size * label_patch * label_patch);
        for &idx in batch_indices {
            let sample = self.dataset.get(idx)?;
            inputs_vec.extend(sample.inputs);
            labels_vec.extend(sample.labels.into_iter().map(|v| v as i64));
        }

        let inputs = Tensor::<B, 4>::from_data(
            TensorData::new(inputs_vec, [batch_size, patch, patch, bands]),
            &self.device,
        );
        let labels = Tensor::<B, 4, Int>::from_data(
            TensorData::new(labels_vec, [batch_size, label_patch, label_patch, 1]),
            &self.device,
        );
        let (inputs, targets) = self.preprocessing.apply(inputs, labels);

        Ok(PatchBatch {
            inputs,
            targets,
            batch_size,
        })
    }
}

pub struct PatchBatch<B: Backend> {
    /// `[N, C, P, P]` raw values.
    pub inputs: Tensor<B, 4>,
    /// `[N, K, Pl, Pl]` one-hot.
    pub targets: Tensor<B, 4>,
    pub batch_size: usize,
}

impl<B: Backend> Iterator for PatchLoader<'_, B> {
    type Item = Result<PatchBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.dataset.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.dataset.len());
        let batch = self.load_batch(&self.indices[self.current_idx..end_idx]);
        self.current_idx = end_idx;

        Some(batch)
    }
}
