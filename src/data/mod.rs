pub mod raster;
pub mod patches;
pub mod dataset;
pub mod preprocessing;
pub mod dataloader;

pub use raster::{Raster, Region};
pub use patches::PatchesImage;
pub use dataset::{check_files_order, PatchSample, PatchesImagesDataset, INPUT_KEY, LABELS_KEY};
pub use preprocessing::{one_hot, DatasetPreprocessing};
pub use dataloader::{PatchBatch, PatchLoader};
