// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lightweight `nn.Module` style surface for the trigger-cell distributor.
//!
//! Layers expose explicit forward/backward passes and accumulate Euclidean
//! gradients on their [`Parameter`]s; optimisers consume those accumulators.

pub mod checkpoint;
pub mod io;
pub mod layers;
pub mod loss;
pub mod module;
pub mod optim;

pub use checkpoint::{CheckpointError, CheckpointManager};
pub use io::{ModuleSnapshot, StoredTensor};
pub use layers::conv::Conv1d;
pub use layers::linear::Linear;
pub use layers::{Relu, Selu};
pub use loss::{wasserstein_1d, Loss, SumSquaredError, Wasserstein1d};
pub use module::{Module, Parameter};
pub use optim::{Adam, AdamState};

pub use tc_tensor::{PureResult, Tensor, TensorError};
