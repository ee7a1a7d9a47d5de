use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    None,
}

impl Activation {
    pub fn is_relu(self) -> bool {
        matches!(self, Activation::Relu)
    }
}

/// One convolution stage of an encoder stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kernel_size: usize,
    pub depth: usize,
    pub activation: Activation,
}

impl StageSpec {
    pub fn relu(kernel_size: usize, depth: usize) -> Self {
        Self {
            kernel_size,
            depth,
            activation: Activation::Relu,
        }
    }
}

/// Total spatial shrink (both sides) of a stack of valid-mode convolutions.
pub fn total_shrink(stages: &[StageSpec]) -> usize {
    stages.iter().map(|s| s.kernel_size - 1).sum()
}

pub fn validate_stages(stages: &[StageSpec]) -> Result<()> {
    if stages.is_empty() {
        bail!("encoder needs at least one stage");
    }
    for (i, stage) in stages.iter().enumerate() {
        if stage.kernel_size == 0 {
            bail!("stage {} has a zero kernel size", i + 1);
        }
        if stage.depth == 0 {
            bail!("stage {} has a zero depth", i + 1);
        }
    }
    Ok(())
}

/// Decoder stage mirroring an encoder stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStage {
    pub kernel_size: usize,
    pub depth: usize,
    pub activation: Activation,
    /// Index of the encoder output added to this stage's output.
    pub skip_from: Option<usize>,
}

/// Derive the decoder of a U-Net like stack from its encoder.
///
/// Stage `i` undoes encoder stage `n-1-i`, takes the depth of encoder stage `n-2-i`
/// and adds its output. The last stage projects to `n_classes` without activation.
pub fn mirror_decoder(encoder: &[StageSpec], n_classes: usize) -> Vec<DecoderStage> {
    let n = encoder.len();
    (0..n)
        .map(|i| {
            let kernel_size = encoder[n - 1 - i].kernel_size;
            if i + 1 < n {
                let skip = n - 2 - i;
                DecoderStage {
                    kernel_size,
                    depth: encoder[skip].depth,
                    activation: encoder[n - 1 - i].activation,
                    skip_from: Some(skip),
                }
            } else {
                DecoderStage {
                    kernel_size,
                    depth: n_classes,
                    activation: Activation::None,
                    skip_from: None,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unet_encoder() -> Vec<StageSpec> {
        vec![
            StageSpec::relu(3, 16),
            StageSpec::relu(3, 32),
            StageSpec::relu(3, 64),
            StageSpec::relu(3, 64),
        ]
    }

    #[test]
    fn test_mirror_decoder_depths_and_skips() {
        let decoder = mirror_decoder(&unet_encoder(), 6);
        let depths: Vec<usize> = decoder.iter().map(|d| d.depth).collect();
        let skips: Vec<Option<usize>> = decoder.iter().map(|d| d.skip_from).collect();
        assert_eq!(depths, vec![64, 32, 16, 6]);
        assert_eq!(skips, vec![Some(2), Some(1), Some(0), None]);
        assert_eq!(decoder[3].activation, Activation::None);
    }

    #[test]
    fn test_total_shrink() {
        assert_eq!(total_shrink(&unet_encoder()), 8);
        let classifier = [
            StageSpec::relu(5, 16),
            StageSpec::relu(5, 16),
            StageSpec::relu(5, 32),
            StageSpec::relu(4, 32),
        ];
        assert_eq!(total_shrink(&classifier), 15);
    }

    #[test]
    fn test_validate_rejects_bad_stacks() {
        assert!(validate_stages(&[]).is_err());
        assert!(validate_stages(&[StageSpec::relu(0, 4)]).is_err());
        assert!(validate_stages(&[StageSpec::relu(3, 0)]).is_err());
        assert!(validate_stages(&unet_encoder()).is_ok());
    }

    #[test]
    fn test_stage_spec_yaml() {
        let spec: StageSpec =
            serde_yaml::from_str("kernel_size: 3\ndepth: 16\nactivation: relu\n").unwrap();
        assert_eq!(spec, StageSpec::relu(3, 16));
    }
}
