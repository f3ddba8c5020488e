// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::bins::{unique_in_order, without_tail};

/// Index groups of the local variance estimate, one per distinct bin of the
/// non-replica region, in first-occurrence order.
///
/// The group of bin `b` holds every index `i` (replicas included) with
/// `b <= bins[i] <= b + boundary_width`.
#[derive(Clone, Debug, PartialEq)]
pub struct VarianceWindows {
    groups: Vec<(i32, Vec<usize>)>,
}

impl VarianceWindows {
    pub fn new(bins: &[i32], boundary_size: usize, boundary_width: usize) -> Self {
        let width = boundary_width as i64;
        let groups = unique_in_order(without_tail(bins, boundary_size))
            .into_iter()
            .map(|bin| {
                let lo = bin as i64;
                let members = bins
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| {
                        let b = **b as i64;
                        b >= lo && b <= lo + width
                    })
                    .map(|(i, _)| i)
                    .collect();
                (bin, members)
            })
            .collect();
        Self { groups }
    }

    pub fn bins(&self) -> impl Iterator<Item = i32> + '_ {
        self.groups.iter().map(|(bin, _)| *bin)
    }

    pub fn groups(&self) -> &[(i32, Vec<usize>)] {
        &self.groups
    }

    /// Sum over groups of the population variance of `data` at the group's
    /// indices. Groups of a single element contribute zero.
    pub fn value(&self, data: &[f32]) -> f32 {
        self.groups
            .iter()
            .map(|(_, members)| {
                let (mean, n) = group_mean(data, members);
                if n < 2 {
                    return 0.0;
                }
                members
                    .iter()
                    .map(|&i| {
                        let d = data[i] as f64 - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / n as f64
            })
            .sum::<f64>() as f32
    }

    /// Gradient of [`VarianceWindows::value`] with respect to `data`.
    pub fn gradient(&self, data: &[f32]) -> Vec<f32> {
        let mut grad = vec![0.0f32; data.len()];
        for (_, members) in &self.groups {
            let (mean, n) = group_mean(data, members);
            if n < 2 {
                continue;
            }
            for &i in members {
                grad[i] += (2.0 * (data[i] as f64 - mean) / n as f64) as f32;
            }
        }
        grad
    }
}

fn group_mean(data: &[f32], members: &[usize]) -> (f64, usize) {
    let n = members.len();
    if n == 0 {
        return (0.0, 0);
    }
    let sum: f64 = members.iter().map(|&i| data[i] as f64).sum();
    (sum / n as f64, n)
}

/// Local variance of `data` grouped by shifted `bins`.
pub fn local_variance(data: &[f32], bins: &[i32], boundary_size: usize, boundary_width: usize) -> f32 {
    VarianceWindows::new(bins, boundary_size, boundary_width).value(data)
}
