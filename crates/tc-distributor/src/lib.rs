// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Redistributes trigger-cell signal values across periodic phi bins.
//!
//! A small dense/convolutional network is trained per R/z slice against a
//! composite loss that keeps the output close to the original signal,
//! smooth across neighbouring bins and consistent across the periodic
//! boundary. [`TriggerCellDistributor`] owns one slice's training state and
//! [`optimize_slice`] drives it for a fixed number of epochs.

pub mod architecture;
pub mod bins;
pub mod data;
pub mod distributor;
pub mod driver;
pub mod error;
pub mod logs;
pub mod loss;
pub mod variance;

pub use architecture::{Architecture, ArchitectureConfig};
pub use bins::{histogram_fixed_width_bins, shift_boundary_bins, unique_in_order};
pub use data::{AffineDenormalizer, Postprocess, RzSlice, SliceFile};
pub use distributor::{
    DistributorSettings, Lifecycle, StepOutcome, StepPhase, TrainingState, TriggerCellDistributor,
};
pub use driver::{build_distributor, optimize_slice, RunSummary};
pub use error::{DistributorError, PreconditionViolation};
pub use logs::{gradient_tag, save_gradient_logs, save_scalar_logs};
pub use loss::{ComposedLoss, ConstantSchedule, LossComposer, LossSchedule, LossTerms, LossWeights};
pub use tc_nn::wasserstein_1d;
pub use variance::{local_variance, VarianceWindows};
