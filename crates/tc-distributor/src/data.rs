// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::bins::bins_from_floats;
use crate::error::DistributorError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Maps network-space values to physical values.
///
/// `backward` is the vector-Jacobian product: given the gradient with
/// respect to the postprocessed values it returns the gradient with respect
/// to the inputs.
pub trait Postprocess {
    fn postprocess(&self, values: &[f32]) -> Vec<f32>;

    fn backward(&self, values: &[f32], grad_output: &[f32]) -> Vec<f32>;
}

/// `y = x * scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineDenormalizer {
    pub scale: f32,
    pub offset: f32,
}

impl AffineDenormalizer {
    pub fn new(scale: f32, offset: f32) -> Self {
        Self { scale, offset }
    }

    /// Undoes the normalisation of phi values into `[0, 1]`.
    pub fn from_phi_bounds((min_phi, max_phi): (f32, f32)) -> Self {
        Self::new(max_phi - min_phi, min_phi)
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Postprocess for AffineDenormalizer {
    fn postprocess(&self, values: &[f32]) -> Vec<f32> {
        values.iter().map(|v| v * self.scale + self.offset).collect()
    }

    fn backward(&self, _values: &[f32], grad_output: &[f32]) -> Vec<f32> {
        grad_output.iter().map(|g| g * self.scale).collect()
    }
}

/// One R/z slice: normalised signal values, their phi bin assignment and the
/// number of replicated boundary cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RzSlice {
    pub values: Vec<f32>,
    pub bins: Vec<f32>,
    pub boundary_size: usize,
}

impl RzSlice {
    /// Integer bin assignment, checked against the value count.
    pub fn integer_bins(&self) -> Result<Vec<i32>, DistributorError> {
        if self.bins.len() != self.values.len() {
            return Err(DistributorError::InvalidSlice {
                reason: format!(
                    "{} bins for {} values",
                    self.bins.len(),
                    self.values.len()
                ),
            });
        }
        bins_from_floats(&self.bins)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceFile {
    pub slices: Vec<RzSlice>,
}

impl SliceFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DistributorError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DistributorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn slice(&self, index: usize) -> Result<&RzSlice, DistributorError> {
        self.slices
            .get(index)
            .ok_or_else(|| DistributorError::InvalidSlice {
                reason: format!("slice {index} requested but the file holds {}", self.slices.len()),
            })
    }
}
