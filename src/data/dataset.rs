use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::patches::PatchesImage;

pub const INPUT_KEY: &str = "input_xs";
pub const LABELS_KEY: &str = "labels";

/// One raw training sample, both tiles pixel-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSample {
    /// `P x P x C` input values.
    pub inputs: Vec<f32>,
    /// `Pl x Pl x 1` class indices.
    pub labels: Vec<f32>,
}

/// Trailing `_`-separated token of the file stem, e.g. `12` for `xs_patches_12.tif`.
fn stem_suffix(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('_')?;
    Some(suffix.to_string())
}

/// Check that two sorted file lists pair up one to one.
///
/// Lists must have the same length, and paired stems must either both lack a
/// `_suffix` or carry the same one.
pub fn check_files_order(files: &[PathBuf], reference: &[PathBuf]) -> Result<()> {
    if files.len() != reference.len() {
        bail!(
            "{} files cannot be paired with {} files",
            files.len(),
            reference.len()
        );
    }
    for (a, b) in files.iter().zip(reference) {
        match (stem_suffix(a), stem_suffix(b)) {
            (None, None) => {}
            (Some(sa), Some(sb)) if sa == sb => {}
            _ => bail!("{} and {} are not aligned", a.display(), b.display()),
        }
    }
    Ok(())
}

/// Patches read from aligned lists of patches-images, one list per source.
#[derive(Debug, Clone)]
pub struct PatchesImagesDataset {
    inputs: Vec<PatchesImage>,
    labels: Vec<PatchesImage>,
    /// `(file, patch)` for each global sample index.
    index: Vec<(usize, usize)>,
}

impl PatchesImagesDataset {
    /// `sources` maps source names to their patches-image files.
    ///
    /// `labels` is required. Every other key is an input source; sources are
    /// taken in key order and their bands stacked, so they must share the
    /// patch size and count file by file.
    pub fn new(sources: BTreeMap<String, Vec<PathBuf>>) -> Result<Self> {
        let mut sources = sources;
        let mut labels = sources
            .remove(LABELS_KEY)
            .ok_or_else(|| anyhow!("missing '{LABELS_KEY}' source"))?;
        if sources.is_empty() {
            bail!("no input source next to '{LABELS_KEY}'");
        }
        labels.sort();

        let mut per_source = Vec::with_capacity(sources.len());
        for (key, mut files) in sources {
            files.sort();
            check_files_order(&files, &labels).map_err(|e| anyhow!("source '{key}': {e}"))?;
            let images = files.iter().map(PatchesImage::open).collect::<Result<Vec<_>>>()?;
            per_source.push(images);
        }

        let inputs = (0..labels.len())
            .map(|file| {
                let images: Vec<PatchesImage> = per_source.iter().map(|source| source[file].clone()).collect();
                PatchesImage::concat_bands(&images)
            })
            .collect::<Result<Vec<_>>>()?;
        let labels = labels.iter().map(PatchesImage::open).collect::<Result<Vec<_>>>()?;
        Self::from_images(inputs, labels)
    }

    pub fn from_files(xs: Vec<PathBuf>, labels: Vec<PathBuf>) -> Result<Self> {
        let mut sources = BTreeMap::new();
        sources.insert(INPUT_KEY.to_string(), xs);
        sources.insert(LABELS_KEY.to_string(), labels);
        Self::new(sources)
    }

    pub fn from_images(inputs: Vec<PatchesImage>, labels: Vec<PatchesImage>) -> Result<Self> {
        if inputs.is_empty() {
            bail!("no patches-images given");
        }
        if inputs.len() != labels.len() {
            bail!("{} input images for {} label images", inputs.len(), labels.len());
        }

        let first_x = &inputs[0];
        let first_y = &labels[0];
        let mut index = Vec::new();
        for (file, (x, y)) in inputs.iter().zip(&labels).enumerate() {
            if x.n_patches() != y.n_patches() {
                bail!(
                    "{} holds {} patches but {} holds {}",
                    x.path().display(),
                    x.n_patches(),
                    y.path().display(),
                    y.n_patches()
                );
            }
            if x.patch_size() != first_x.patch_size() || x.bands() != first_x.bands() {
                bail!("{} differs in patch size or bands from {}", x.path().display(), first_x.path().display());
            }
            if y.patch_size() != first_y.patch_size() || y.bands() != 1 {
                bail!("{} must hold single-band {}px label patches", y.path().display(), first_y.patch_size());
            }
            index.extend((0..x.n_patches()).map(|patch| (file, patch)));
        }

        log::info!(
            "Dataset: {} patches from {} files ({}x{}x{} inputs, {}x{} labels)",
            index.len(),
            inputs.len(),
            first_x.patch_size(),
            first_x.patch_size(),
            first_x.bands(),
            first_y.patch_size(),
            first_y.patch_size()
        );

        Ok(Self {
            inputs,
            labels,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn input_patch_size(&self) -> usize {
        self.inputs[0].patch_size()
    }

    pub fn input_bands(&self) -> usize {
        self.inputs[0].bands()
    }

    pub fn label_patch_size(&self) -> usize {
        self.labels[0].patch_size()
    }

    pub fn get(&self, idx: usize) -> Result<PatchSample> {
        let &(file, patch) = self
            .index
            .get(idx)
            .ok_or_else(|| anyhow!("sample {idx} out of range ({} patches)", self.len()))?;
        Ok(PatchSample {
            inputs: self.inputs[file].patch(patch).to_vec(),
            labels: self.labels[file].patch(patch).to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Writes `n` 4-band input patches of value `base + i` with labels `i % 6`.
    fn write_pair(dir: &TempDir, suffix: &str, n: usize, base: f32) -> (PathBuf, PathBuf) {
        let xs: Vec<Vec<f32>> = (0..n).map(|i| vec![base + i as f32; 4 * 4 * 4]).collect();
        let ys: Vec<Vec<f32>> = (0..n).map(|i| vec![(i % 6) as f32; 4 * 4]).collect();
        let x_path = dir.path().join(format!("xs_patches_{suffix}.tif"));
        let y_path = dir.path().join(format!("labels_patches_{suffix}.tif"));
        PatchesImage::stack(4, 4, &xs).unwrap().write_f32(&x_path).unwrap();
        PatchesImage::stack(4, 1, &ys).unwrap().write_u8(&y_path).unwrap();
        (x_path, y_path)
    }

    #[test]
    fn test_check_files_order() {
        let xs = vec![PathBuf::from("a/xs_1.tif"), PathBuf::from("a/xs_2.tif")];
        let ys = vec![PathBuf::from("b/lab_1.tif"), PathBuf::from("b/lab_2.tif")];
        assert!(check_files_order(&xs, &ys).is_ok());

        let swapped = vec![ys[1].clone(), ys[0].clone()];
        assert!(check_files_order(&xs, &swapped).is_err());
        assert!(check_files_order(&xs, &ys[..1]).is_err());

        // Stems without a suffix only need matching counts.
        let plain = vec![PathBuf::from("xs.tif")];
        let other = vec![PathBuf::from("labels.tif")];
        assert!(check_files_order(&plain, &other).is_ok());

        // A suffix on one side only cannot be paired.
        let numbered = vec![PathBuf::from("xs_3.tif")];
        assert!(check_files_order(&numbered, &other).is_err());
        assert!(check_files_order(&other, &numbered).is_err());
    }

    #[test]
    fn test_files_are_sorted_before_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let (x1, y1) = write_pair(&dir, "1", 3, 100.0);
        let (x2, y2) = write_pair(&dir, "2", 2, 200.0);

        let dataset = PatchesImagesDataset::from_files(vec![x2, x1], vec![y1, y2]).unwrap();
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.input_patch_size(), 4);
        assert_eq!(dataset.input_bands(), 4);
        assert_eq!(dataset.label_patch_size(), 4);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.inputs[0], 100.0);
        let fourth = dataset.get(3).unwrap();
        assert_eq!(fourth.inputs[0], 200.0);
        assert_eq!(fourth.labels, vec![0.0; 16]);
        assert!(dataset.get(5).is_err());
    }

    #[test]
    fn test_patch_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (x1, _) = write_pair(&dir, "1", 3, 0.0);
        let (_, y2) = write_pair(&dir, "1b", 2, 0.0);
        let renamed = dir.path().join("labels_patches_1.tif");
        std::fs::rename(&y2, &renamed).unwrap();
        assert!(PatchesImagesDataset::from_files(vec![x1], vec![renamed]).is_err());
    }

    #[test]
    fn test_labels_and_an_input_are_required() {
        let mut sources = BTreeMap::new();
        sources.insert("x1".to_string(), vec![]);
        assert!(PatchesImagesDataset::new(sources).is_err());

        let mut sources = BTreeMap::new();
        sources.insert(LABELS_KEY.to_string(), vec![]);
        assert!(PatchesImagesDataset::new(sources).is_err());
    }

    #[test]
    fn test_named_sources_are_stacked_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let (_, y) = write_pair(&dir, "1", 2, 0.0);
        let x1 = dir.path().join("x1_patches_1.tif");
        let x2 = dir.path().join("x2_patches_1.tif");
        let a: Vec<Vec<f32>> = (0..2).map(|_| vec![10.0; 4 * 4 * 2]).collect();
        let b: Vec<Vec<f32>> = (0..2).map(|_| vec![20.0; 4 * 4]).collect();
        PatchesImage::stack(4, 2, &a).unwrap().write_f32(&x1).unwrap();
        PatchesImage::stack(4, 1, &b).unwrap().write_f32(&x2).unwrap();

        let mut sources = BTreeMap::new();
        sources.insert("x2".to_string(), vec![x2]);
        sources.insert("x1".to_string(), vec![x1]);
        sources.insert(LABELS_KEY.to_string(), vec![y.clone()]);
        let dataset = PatchesImagesDataset::new(sources).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.input_bands(), 3);
        assert_eq!(&dataset.get(1).unwrap().inputs[..3], &[10.0, 10.0, 20.0]);

        let odd = dir.path().join("x3_patches_2.tif");
        PatchesImage::stack(4, 1, &b).unwrap().write_f32(&odd).unwrap();
        let mut sources = BTreeMap::new();
        sources.insert("x3".to_string(), vec![odd]);
        sources.insert(LABELS_KEY.to_string(), vec![y]);
        assert!(PatchesImagesDataset::new(sources).is_err());
    }
}
