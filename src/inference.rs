use anyhow::{bail, Result};
use burn::prelude::*;

use crate::data::Raster;
use crate::model::PixelClassifier;

/// Output of a fully convolutional pass over a whole raster.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Single band of class indices.
    pub classes: Raster,
    /// One band per class.
    pub probabilities: Raster,
    /// Pixels lost on each side relative to the input.
    pub offset: usize,
}

/// `[1, C, H, W]` tensor from a pixel-interleaved raster.
pub fn raster_to_tensor<B: Backend>(raster: &Raster, device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 4>::from_data(
        TensorData::new(raster.data.clone(), [1, raster.height, raster.width, raster.bands]),
        device,
    )
    .permute([0, 3, 1, 2])
}

/// Run `model` over the whole raster in one pass. No tiling.
pub fn predict<B: Backend, M: PixelClassifier<B>>(
    model: &M,
    raster: &Raster,
    device: &B::Device,
) -> Result<Prediction> {
    let (Some(width), Some(height)) = (model.output_size(raster.width), model.output_size(raster.height)) else {
        bail!(
            "a {}x{} raster is too small for this model",
            raster.width,
            raster.height
        );
    };
    let probabilities = model.class_probabilities(raster_to_tensor::<B>(raster, device));
    let n_classes = probabilities.dims()[1];
    log::debug!("Prediction map: {}x{}x{}", width, height, n_classes);

    let classes: Vec<f32> = probabilities
        .clone()
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("cannot read class map: {e:?}"))?
        .into_iter()
        .map(|c| c as f32)
        .collect();
    let values: Vec<f32> = probabilities
        .permute([0, 2, 3, 1])
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("cannot read probabilities: {e:?}"))?;

    Ok(Prediction {
        classes: Raster::new(width, height, 1, classes)?,
        probabilities: Raster::new(width, height, n_classes, values)?,
        offset: (raster.height - height) / 2,
    })
}
