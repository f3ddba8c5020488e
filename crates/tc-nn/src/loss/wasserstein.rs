// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{PureResult, Tensor, TensorError};

/// Squared cumulative-sum distance between two equally long signals,
/// `sum_i (cumsum(a)[i] - cumsum(b)[i])^2`.
///
/// The inputs are treated as unnormalised measures in their given order, so
/// position matters: nothing is sorted. This is a cheap stand-in for the 1-D
/// earth mover's distance.
pub fn wasserstein_1d(a: &[f32], b: &[f32]) -> PureResult<f32> {
    if a.len() != b.len() {
        return Err(TensorError::DataLength {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(cumulative_gaps(a, b).iter().map(|gap| gap * gap).sum())
}

/// `cumsum(a) - cumsum(b)` for equally long inputs.
fn cumulative_gaps(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut running = 0.0f32;
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            running += x - y;
            running
        })
        .collect()
}

/// [`wasserstein_1d`] as a differentiable [`Loss`] on row tensors.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wasserstein1d;

impl Wasserstein1d {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for Wasserstein1d {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        if prediction.shape() != target.shape() {
            return Err(TensorError::ShapeMismatch {
                left: prediction.shape(),
                right: target.shape(),
            });
        }
        let value = wasserstein_1d(target.data(), prediction.data())?;
        Tensor::from_vec(1, 1, vec![value])
    }

    /// Each prediction entry feeds every cumulative sum at or after its
    /// position, so the gradient is a suffix sum of the gaps.
    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        if prediction.shape() != target.shape() {
            return Err(TensorError::ShapeMismatch {
                left: prediction.shape(),
                right: target.shape(),
            });
        }
        let gaps = cumulative_gaps(prediction.data(), target.data());
        let mut grad = vec![0.0f32; gaps.len()];
        let mut suffix = 0.0f32;
        for (slot, gap) in grad.iter_mut().zip(gaps.iter()).rev() {
            suffix += gap;
            *slot = 2.0 * suffix;
        }
        let (rows, cols) = prediction.shape();
        Tensor::from_vec(rows, cols, grad)
    }
}
