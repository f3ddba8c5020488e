// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{PureResult, Tensor, TensorError};

/// Squared error with sum reduction, `sum((prediction - target)^2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SumSquaredError;

impl SumSquaredError {
    /// Creates a new sum-of-squares loss instance.
    pub fn new() -> Self {
        Self
    }
}

fn check_shapes(prediction: &Tensor, target: &Tensor) -> PureResult<()> {
    if prediction.shape() != target.shape() {
        return Err(TensorError::ShapeMismatch {
            left: prediction.shape(),
            right: target.shape(),
        });
    }
    Ok(())
}

impl Loss for SumSquaredError {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        check_shapes(prediction, target)?;
        let sum = prediction
            .data()
            .iter()
            .zip(target.data().iter())
            .map(|(p, t)| (p - t) * (p - t))
            .sum();
        Tensor::from_vec(1, 1, vec![sum])
    }

    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        check_shapes(prediction, target)?;
        prediction.sub(target)?.scale(2.0)
    }
}
