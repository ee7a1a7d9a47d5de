use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use super::raster::Raster;

/// A raster holding square patches stacked vertically: width `P`, height `N * P`.
#[derive(Debug, Clone)]
pub struct PatchesImage {
    path: PathBuf,
    raster: Raster,
}

impl PatchesImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raster = Raster::read(path)?;
        Self::from_raster(path, raster)
    }

    pub fn from_raster(path: impl Into<PathBuf>, raster: Raster) -> Result<Self> {
        let path = path.into();
        if raster.width == 0 || raster.height % raster.width != 0 {
            bail!(
                "{}: a {}x{} raster is not a stack of square patches",
                path.display(),
                raster.width,
                raster.height
            );
        }
        Ok(Self { path, raster })
    }

    /// Build a patches-image from `P x P x bands` patches (pixel-interleaved).
    pub fn stack(patch_size: usize, bands: usize, patches: &[Vec<f32>]) -> Result<Raster> {
        let mut data = Vec::with_capacity(patches.len() * patch_size * patch_size * bands);
        for (i, patch) in patches.iter().enumerate() {
            if patch.len() != patch_size * patch_size * bands {
                bail!("patch {i} has {} samples", patch.len());
            }
            data.extend_from_slice(patch);
        }
        Raster::new(patch_size, patch_size * patches.len(), bands, data)
    }

    /// Stack the bands of same-shaped patches-images, in order, into one image.
    pub fn concat_bands(images: &[PatchesImage]) -> Result<PatchesImage> {
        let Some(first) = images.first() else {
            bail!("no patches-images to concatenate");
        };
        for image in &images[1..] {
            if image.raster.width != first.raster.width || image.raster.height != first.raster.height {
                bail!(
                    "{} is {}x{} but {} is {}x{}",
                    image.path.display(),
                    image.raster.width,
                    image.raster.height,
                    first.path.display(),
                    first.raster.width,
                    first.raster.height
                );
            }
        }
        if images.len() == 1 {
            return Ok(first.clone());
        }

        let bands: usize = images.iter().map(|image| image.bands()).sum();
        let pixels = first.raster.width * first.raster.height;
        let mut data = Vec::with_capacity(pixels * bands);
        for pixel in 0..pixels {
            for image in images {
                let b = image.bands();
                data.extend_from_slice(&image.raster.data[pixel * b..(pixel + 1) * b]);
            }
        }
        let raster = Raster::new(first.raster.width, first.raster.height, bands, data)?;
        Ok(Self {
            path: first.path.clone(),
            raster,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn patch_size(&self) -> usize {
        self.raster.width
    }

    pub fn bands(&self) -> usize {
        self.raster.bands
    }

    pub fn n_patches(&self) -> usize {
        self.raster.height / self.raster.width
    }

    /// Samples of patch `index`, `P x P x bands` in row-major pixel-interleaved order.
    pub fn patch(&self, index: usize) -> &[f32] {
        let len = self.patch_size() * self.patch_size() * self.bands();
        &self.raster.data[index * len..(index + 1) * len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patches_are_read_back_in_order() {
        let patches: Vec<Vec<f32>> = (0..3).map(|i| vec![i as f32; 2 * 2 * 4]).collect();
        let raster = PatchesImage::stack(2, 4, &patches).unwrap();
        assert_eq!((raster.width, raster.height), (2, 6));

        let image = PatchesImage::from_raster("mem.tif", raster).unwrap();
        assert_eq!(image.n_patches(), 3);
        assert_eq!(image.patch_size(), 2);
        assert_eq!(image.patch(2), patches[2].as_slice());
    }

    #[test]
    fn test_height_must_be_a_multiple_of_width() {
        let raster = Raster::filled(16, 40, 1, 0.0);
        assert!(PatchesImage::from_raster("bad.tif", raster).is_err());
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels_1.tif");
        let patches = vec![vec![3.0], vec![1.0], vec![4.0]];
        PatchesImage::stack(1, 1, &patches).unwrap().write_u8(&path).unwrap();

        let image = PatchesImage::open(&path).unwrap();
        assert_eq!(image.n_patches(), 3);
        assert_eq!(image.patch(1), &[1.0]);
        assert_eq!(image.path(), path.as_path());
    }

    #[test]
    fn test_concat_bands_interleaves_per_pixel() {
        let a = PatchesImage::from_raster("x1_1.tif", Raster::new(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap()).unwrap();
        let b = PatchesImage::from_raster("x2_1.tif", Raster::new(1, 2, 1, vec![9.0, 8.0]).unwrap()).unwrap();

        let merged = PatchesImage::concat_bands(&[a.clone(), b]).unwrap();
        assert_eq!(merged.bands(), 3);
        assert_eq!(merged.n_patches(), 2);
        assert_eq!(merged.patch(0), &[1.0, 2.0, 9.0]);
        assert_eq!(merged.patch(1), &[3.0, 4.0, 8.0]);

        let tall = PatchesImage::from_raster("x3_1.tif", Raster::filled(1, 3, 1, 0.0)).unwrap();
        assert!(PatchesImage::concat_bands(&[a, tall]).is_err());
    }
}
