use std::fmt::Write;

/// One row of a model summary: node name, `[H, W, C]` output shape, trainable parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub output_shape: [usize; 3],
    pub params: usize,
}

impl LayerSummary {
    pub fn new(name: impl Into<String>, output_shape: [usize; 3], params: usize) -> Self {
        Self {
            name: name.into(),
            output_shape,
            params,
        }
    }
}

/// Weights plus biases of a square convolution (plain or transposed).
pub fn conv_params(kernel_size: usize, in_channels: usize, out_channels: usize) -> usize {
    kernel_size * kernel_size * in_channels * out_channels + out_channels
}

pub fn format_summary(layers: &[LayerSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<30} {:<20} {:>10}", "Layer", "Output shape", "Params");
    let _ = writeln!(out, "{}", "=".repeat(62));
    for layer in layers {
        let [h, w, c] = layer.output_shape;
        let _ = writeln!(
            out,
            "{:<30} {:<20} {:>10}",
            layer.name,
            format!("({h}, {w}, {c})"),
            layer.params
        );
    }
    let _ = writeln!(out, "{}", "=".repeat(62));
    let total: usize = layers.iter().map(|l| l.params).sum();
    let _ = write!(out, "Total params: {total}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_summary_totals() {
        let layers = vec![
            LayerSummary::new("input_xs", [16, 16, 4], 0),
            LayerSummary::new("conv1", [12, 12, 16], conv_params(5, 4, 16)),
        ];
        let text = format_summary(&layers);
        assert!(text.contains("conv1"));
        assert!(text.contains("(12, 12, 16)"));
        assert!(text.ends_with("Total params: 1616"));
    }
}
