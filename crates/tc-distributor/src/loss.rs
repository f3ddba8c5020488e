// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The composite training objective.
//!
//! Four weighted terms are evaluated on postprocessed values: squared
//! deviation from the original signal, local variance across neighbouring
//! phi bins, the cumulative-sum Wasserstein proxy, and agreement between the
//! two copies of the boundary region.

use crate::bins::{histogram_fixed_width_bins, shift_boundary_bins, unique_in_order, without_tail};
use crate::error::{DistributorError, PreconditionViolation};
use crate::variance::VarianceWindows;
use serde::{Deserialize, Serialize};
use tc_nn::{Loss, SumSquaredError, Wasserstein1d};
use tc_tensor::Tensor;

/// Scalar weights of the four loss terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub equality: f32,
    pub local_variance: f32,
    pub wasserstein: f32,
    pub boundary: f32,
}

impl LossWeights {
    pub const fn new(equality: f32, local_variance: f32, wasserstein: f32, boundary: f32) -> Self {
        Self {
            equality,
            local_variance,
            wasserstein,
            boundary,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [
            self.equality,
            self.local_variance,
            self.wasserstein,
            self.boundary,
        ]
    }
}

impl Default for LossWeights {
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0, 1.0)
    }
}

impl From<[f32; 4]> for LossWeights {
    fn from(w: [f32; 4]) -> Self {
        Self::new(w[0], w[1], w[2], w[3])
    }
}

/// Loss weights as a function of the epoch index.
pub trait LossSchedule {
    fn weights(&self, epoch: usize, initial: LossWeights) -> LossWeights;
}

/// Keeps the initial weights for the whole run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantSchedule;

impl LossSchedule for ConstantSchedule {
    fn weights(&self, _epoch: usize, initial: LossWeights) -> LossWeights {
        initial
    }
}

impl<F> LossSchedule for F
where
    F: Fn(usize, LossWeights) -> LossWeights,
{
    fn weights(&self, epoch: usize, initial: LossWeights) -> LossWeights {
        self(epoch, initial)
    }
}

/// The weighted value of every loss term.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossTerms {
    pub equality_loss: f32,
    pub local_variance_loss: f32,
    pub wasserstein_loss: f32,
    pub boundary_loss: f32,
}

impl LossTerms {
    /// `(name, value)` pairs in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> {
        [
            ("equality_loss", self.equality_loss),
            ("local_variance_loss", self.local_variance_loss),
            ("wasserstein_loss", self.wasserstein_loss),
            ("boundary_loss", self.boundary_loss),
        ]
        .into_iter()
    }

    pub fn total(&self) -> f32 {
        self.iter().map(|(_, v)| v).sum()
    }
}

/// Result of one loss evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposedLoss {
    pub terms: LossTerms,
    /// Distinct shifted output bins outside the trailing replica region, in
    /// first-occurrence order.
    pub unique_outbins: Vec<i32>,
    pub shifted_outbins: Vec<i32>,
    windows: VarianceWindows,
}

/// Validates the pipeline invariants and evaluates the composite loss for
/// one R/z slice.
#[derive(Clone, Debug)]
pub struct LossComposer {
    inbins: Vec<i32>,
    boundary_size: usize,
    boundary_width: usize,
    nbins_phi: usize,
    phi_bounds: (f32, f32),
}

impl LossComposer {
    /// Shifts `inbins` once for the lifetime of the composer. Only the
    /// boundary size and the shift offset are checked here; bin ranges are validated on every
    /// [`LossComposer::compose`] call.
    pub fn new(
        inbins: &[i32],
        boundary_size: usize,
        window_size: usize,
        nbins_phi: usize,
        phi_bounds: (f32, f32),
    ) -> Result<Self, DistributorError> {
        if boundary_size > inbins.len() {
            return Err(PreconditionViolation::BoundaryTooLarge {
                boundary_size,
                len: inbins.len(),
            }
            .into());
        }
        Ok(Self {
            inbins: shift_boundary_bins(inbins, boundary_size)?,
            boundary_size,
            boundary_width: window_size.saturating_sub(1),
            nbins_phi,
            phi_bounds,
        })
    }

    /// Shifted input bins.
    pub fn inbins(&self) -> &[i32] {
        &self.inbins
    }

    pub fn boundary_size(&self) -> usize {
        self.boundary_size
    }

    pub fn boundary_width(&self) -> usize {
        self.boundary_width
    }

    fn check_inputs(&self, original: &[f32], outdata: &[f32]) -> Result<(), PreconditionViolation> {
        if original.len() != outdata.len() {
            return Err(PreconditionViolation::LengthMismatch {
                original: original.len(),
                output: outdata.len(),
            });
        }
        if self.inbins.len() != outdata.len() {
            return Err(PreconditionViolation::BinsLength {
                bins: self.inbins.len(),
                data: outdata.len(),
            });
        }
        let min = self.inbins.iter().min().copied();
        let max = self.inbins.iter().max().copied();
        let expected_min = -(self.boundary_width as i32);
        let expected_max = self.nbins_phi as i32 - 1;
        if min != Some(expected_min) || max != Some(expected_max) {
            return Err(PreconditionViolation::InputBinsRange {
                min,
                max,
                expected_min,
                expected_max,
            });
        }
        Ok(())
    }

    fn check_outbins(&self, outbins: &[i32], len: usize) -> Result<(), PreconditionViolation> {
        let min = outbins.iter().min().copied();
        let max = outbins.iter().max().copied();
        let in_range = outbins.len() == len
            && min.is_some_and(|m| m >= 0)
            && max.is_some_and(|m| m <= self.nbins_phi as i32 - 1);
        if !in_range {
            return Err(PreconditionViolation::OutputBinsRange {
                min,
                max,
                nbins: self.nbins_phi,
            });
        }
        Ok(())
    }

    fn check_replicas(&self, original: &[f32]) -> Result<(), PreconditionViolation> {
        let b = self.boundary_size;
        let tail_start = original.len() - b;
        for index in 0..b {
            let (head, tail) = (original[index], original[tail_start + index]);
            if head != tail {
                return Err(PreconditionViolation::BoundaryReplicaMismatch { index, head, tail });
            }
        }
        Ok(())
    }

    /// Evaluates the weighted loss terms of `outdata` against `original`.
    ///
    /// Checks run before any term is computed: lengths and bin ranges first,
    /// then boundary replica equality of `original`.
    pub fn compose(
        &self,
        original: &[f32],
        outdata: &[f32],
        weights: LossWeights,
    ) -> Result<ComposedLoss, DistributorError> {
        self.check_inputs(original, outdata)?;
        let outbins = histogram_fixed_width_bins(outdata, self.phi_bounds, self.nbins_phi);
        self.check_outbins(&outbins, outdata.len())?;
        let shifted_outbins = shift_boundary_bins(&outbins, self.boundary_size)?;
        self.check_replicas(original)?;

        let (prediction, target) = as_rows(outdata, original)?;
        let equality = SumSquaredError::new().forward(&prediction, &target)?.data()[0];
        let wasserstein = Wasserstein1d::new().forward(&prediction, &target)?.data()[0];
        let windows = VarianceWindows::new(&shifted_outbins, self.boundary_size, self.boundary_width);
        let variance = windows.value(outdata);
        let boundary = self.boundary_pairs(outdata.len())
            .map(|(head, tail)| {
                let d = outdata[tail] - outdata[head];
                d * d
            })
            .sum::<f32>();

        let terms = LossTerms {
            equality_loss: weights.equality * equality,
            local_variance_loss: weights.local_variance * variance,
            wasserstein_loss: weights.wasserstein * wasserstein,
            boundary_loss: weights.boundary * boundary,
        };
        let unique_outbins = unique_in_order(without_tail(&shifted_outbins, self.boundary_size));
        Ok(ComposedLoss {
            terms,
            unique_outbins,
            shifted_outbins,
            windows,
        })
    }

    /// Gradient of the summed objective with respect to `outdata`. Bin
    /// assignments are piecewise constant and contribute nothing.
    pub fn gradient(
        &self,
        original: &[f32],
        outdata: &[f32],
        composed: &ComposedLoss,
        weights: LossWeights,
    ) -> Result<Vec<f32>, DistributorError> {
        let (prediction, target) = as_rows(outdata, original)?;
        let equality = SumSquaredError::new().backward(&prediction, &target)?;
        let wasserstein = Wasserstein1d::new().backward(&prediction, &target)?;
        let variance = composed.windows.gradient(outdata);

        let mut grad: Vec<f32> = equality
            .data()
            .iter()
            .zip(wasserstein.data())
            .zip(&variance)
            .map(|((e, w), v)| {
                weights.equality * e + weights.wasserstein * w + weights.local_variance * v
            })
            .collect();
        for (head, tail) in self.boundary_pairs(outdata.len()) {
            let d = 2.0 * weights.boundary * (outdata[tail] - outdata[head]);
            grad[tail] += d;
            grad[head] -= d;
        }
        Ok(grad)
    }

    fn boundary_pairs(&self, len: usize) -> impl Iterator<Item = (usize, usize)> {
        let b = self.boundary_size;
        (0..b).map(move |i| (i, len - b + i))
    }
}

fn as_rows(outdata: &[f32], original: &[f32]) -> Result<(Tensor, Tensor), DistributorError> {
    Ok((Tensor::row(outdata.to_vec())?, Tensor::row(original.to_vec())?))
}
