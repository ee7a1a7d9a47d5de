pub mod model;
pub mod data;
pub mod training;
pub mod bundle;
pub mod inference;
pub mod harness;

// Re-exports for convenience
pub use model::{Architecture, ClassifierConfig, FcnnConfig, PatchModel, PixelClassifier};
pub use data::{PatchLoader, PatchesImagesDataset, Raster, Region};
pub use training::{Trainer, TrainingConfig};
pub use harness::{Scenario, tutorial};
