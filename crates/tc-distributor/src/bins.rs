// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Bin bookkeeping for the periodic phi axis.
//!
//! Cells in the first `boundary_size` positions replicate the cells at the
//! upper end of the axis. Shifting their bin indices below zero makes the two
//! edges numerically adjacent, so a plain `[b, b + width]` window covers the
//! wrap without modular arithmetic.

use crate::error::{DistributorError, PreconditionViolation};

/// Subtracts `max(bins) + 1` from the first `boundary_size` entries.
///
/// The maximum is taken over the whole sequence before anything is modified.
/// Entries from `boundary_size` onwards are returned unchanged and a
/// `boundary_size` beyond the length shifts every entry. Fails when the
/// offset or a shifted entry leaves the `i32` range.
pub fn shift_boundary_bins(
    bins: &[i32],
    boundary_size: usize,
) -> Result<Vec<i32>, PreconditionViolation> {
    let Some(&max) = bins.iter().max() else {
        return Ok(Vec::new());
    };
    let offset = max
        .checked_add(1)
        .ok_or(PreconditionViolation::BinOverflow { max })?;
    let head = boundary_size.min(bins.len());
    let mut shifted = bins.to_vec();
    for value in &mut shifted[..head] {
        *value = value
            .checked_sub(offset)
            .ok_or(PreconditionViolation::BinOverflow { max })?;
    }
    Ok(shifted)
}

/// Fixed-width histogram bin index of every value over `range`.
///
/// Values below the range land in bin 0 and values at or above the upper
/// edge land in the last bin. `nbins == 0` yields an empty assignment.
pub fn histogram_fixed_width_bins(values: &[f32], range: (f32, f32), nbins: usize) -> Vec<i32> {
    if nbins == 0 {
        return Vec::new();
    }
    let (lo, hi) = range;
    let span = hi - lo;
    let last = nbins as i64 - 1;
    values
        .iter()
        .map(|&v| {
            let scaled = ((v - lo) / span * nbins as f32).floor();
            // NaN saturates to 0 through the cast.
            (scaled as i64).clamp(0, last) as i32
        })
        .collect()
}

/// Distinct values in order of first occurrence.
pub fn unique_in_order(bins: &[i32]) -> Vec<i32> {
    let mut seen = std::collections::HashSet::with_capacity(bins.len());
    bins.iter().copied().filter(|b| seen.insert(*b)).collect()
}

/// The part of a sequence that excludes the trailing replica region. With no
/// boundary region the whole sequence is returned.
pub fn without_tail(bins: &[i32], boundary_size: usize) -> &[i32] {
    &bins[..bins.len().saturating_sub(boundary_size)]
}

/// Converts bin assignments stored as floats into integers, rejecting values
/// that are not integral or do not fit an `i32`.
pub fn bins_from_floats(values: &[f32]) -> Result<Vec<i32>, DistributorError> {
    values
        .iter()
        .enumerate()
        .map(|(index, &v)| {
            if !v.is_finite() || v.fract() != 0.0 {
                return Err(DistributorError::InvalidSlice {
                    reason: format!("bin {index} is not an integer: {v}"),
                });
            }
            // `i32::MAX as f32` rounds up to 2^31, which the cast would saturate.
            if v.abs() >= i32::MAX as f32 {
                return Err(DistributorError::InvalidSlice {
                    reason: format!("bin {index} is out of range: {v}"),
                });
            }
            Ok(v as i32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_uses_global_maximum() {
        let bins = [0, 0, 1, 1, 2, 2, 3, 3, 0, 0];
        assert_eq!(
            shift_boundary_bins(&bins, 2).unwrap(),
            vec![-4, -4, 1, 1, 2, 2, 3, 3, 0, 0]
        );
    }

    #[test]
    fn shift_leaves_the_body_untouched() {
        let bins = [5, 2, 9, 4, 4, 7, 1];
        for boundary in 0..=bins.len() {
            let shifted = shift_boundary_bins(&bins, boundary).unwrap();
            assert_eq!(&shifted[boundary..], &bins[boundary..]);
            for i in 0..boundary {
                assert_eq!(shifted[i], bins[i] - 10);
            }
        }
    }

    #[test]
    fn shift_of_empty_and_oversized_boundary() {
        assert!(shift_boundary_bins(&[], 3).unwrap().is_empty());
        assert_eq!(shift_boundary_bins(&[1, 2], 5).unwrap(), vec![-2, -1]);
    }

    #[test]
    fn shift_reports_offset_overflow() {
        let err = shift_boundary_bins(&[i32::MAX, 0], 1).unwrap_err();
        assert_eq!(err, PreconditionViolation::BinOverflow { max: i32::MAX });
        let err = shift_boundary_bins(&[i32::MIN, 5], 1).unwrap_err();
        assert_eq!(err, PreconditionViolation::BinOverflow { max: 5 });
    }

    #[test]
    fn histogram_clamps_out_of_range_values() {
        let values = [-1.0, 0.0, 0.24, 0.25, 0.5, 0.99, 1.0, 3.0];
        assert_eq!(
            histogram_fixed_width_bins(&values, (0.0, 1.0), 4),
            vec![0, 0, 0, 1, 2, 3, 3, 3]
        );
        assert!(histogram_fixed_width_bins(&values, (0.0, 1.0), 0).is_empty());
    }

    #[test]
    fn unique_keeps_first_occurrence_order() {
        assert_eq!(unique_in_order(&[3, -1, 3, 2, -1, 0]), vec![3, -1, 2, 0]);
    }

    #[test]
    fn tail_exclusion() {
        let bins = [1, 2, 3, 4];
        assert_eq!(without_tail(&bins, 1), &[1, 2, 3]);
        assert_eq!(without_tail(&bins, 0), &bins);
        assert!(without_tail(&bins, 9).is_empty());
    }

    #[test]
    fn float_bins_must_be_integral() {
        assert_eq!(bins_from_floats(&[0.0, 3.0, -2.0]).unwrap(), vec![0, 3, -2]);
        assert!(matches!(
            bins_from_floats(&[1.5]),
            Err(DistributorError::InvalidSlice { .. })
        ));
        assert!(bins_from_floats(&[f32::NAN]).is_err());
    }

    #[test]
    fn float_bins_beyond_i32_are_rejected() {
        for huge in [i32::MAX as f32, i32::MIN as f32, 1e12] {
            assert!(matches!(
                bins_from_floats(&[huge, 0.0]),
                Err(DistributorError::InvalidSlice { .. })
            ));
        }
        assert_eq!(
            bins_from_floats(&[2_147_483_520.0]).unwrap(),
            vec![2_147_483_520]
        );
    }
}
