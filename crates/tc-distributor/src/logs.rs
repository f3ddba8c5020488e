// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::DistributorError;
use tc_metrics::{HistogramSummary, MetricValue, SummaryWriter};
use tc_tensor::{Tensor, TensorError};

/// Records every named scalar and their sum under `total` at `epoch`.
pub fn save_scalar_logs<'a, W, I>(writer: &mut W, scalars: I, epoch: usize) -> Result<(), DistributorError>
where
    W: SummaryWriter + ?Sized,
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let step = epoch as u64;
    let mut total = 0.0f64;
    for (name, value) in scalars {
        writer.scalar(step, name, value as f64)?;
        total += value as f64;
    }
    writer.scalar(step, "total", total)?;
    Ok(())
}

/// Tag used for the gradient distribution of a parameter.
pub fn gradient_tag(parameter: &str) -> String {
    format!("{}_grads", parameter.replace(':', "_"))
}

/// Records one gradient distribution per parameter at `epoch`. `gradients`
/// and `parameters` must be aligned pairwise.
pub fn save_gradient_logs<W>(
    writer: &mut W,
    gradients: &[(String, Tensor)],
    parameters: &[(String, Tensor)],
    epoch: usize,
) -> Result<(), DistributorError>
where
    W: SummaryWriter + ?Sized,
{
    if gradients.len() != parameters.len() {
        return Err(TensorError::DataLength {
            expected: parameters.len(),
            got: gradients.len(),
        }
        .into());
    }
    for ((_, grad), (name, _)) in gradients.iter().zip(parameters) {
        let summary = HistogramSummary::from_values(grad.data());
        writer.write(epoch as u64, &gradient_tag(name), MetricValue::Distribution(summary))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_metrics::MemorySummaryWriter;

    #[test]
    fn scalars_are_followed_by_their_total() {
        let mut writer = MemorySummaryWriter::new();
        save_scalar_logs(&mut writer, [("a", 1.5), ("b", 2.0)], 7).unwrap();
        let tags: Vec<_> = writer.events().iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, ["a", "b", "total"]);
        let total = writer.tagged("total").next().unwrap();
        assert_eq!(total.step, 7);
        assert_eq!(total.value, MetricValue::Scalar(3.5));
    }

    #[test]
    fn gradient_tags_are_sanitised() {
        assert_eq!(gradient_tag("dense1::weight"), "dense1__weight_grads");
        assert_eq!(gradient_tag("kernel:0"), "kernel_0_grads");
    }

    #[test]
    fn gradient_logs_need_aligned_lists() {
        let mut writer = MemorySummaryWriter::new();
        let grad = vec![("w".to_string(), Tensor::row(vec![1.0, -1.0]).unwrap())];
        save_gradient_logs(&mut writer, &grad, &grad, 0).unwrap();
        assert!(matches!(
            writer.events()[0].value,
            MetricValue::Distribution(HistogramSummary { count: 2, .. })
        ));
        assert!(save_gradient_logs(&mut writer, &grad, &[], 0).is_err());
    }
}
