// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;
use tc_config::RunConfigError;
use tc_metrics::WriterError;
use tc_nn::CheckpointError;
use tc_tensor::TensorError;

/// Invariant that must hold on every loss evaluation. Any violation aborts
/// the current step.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PreconditionViolation {
    #[error("original data has {original} entries but the prediction has {output}")]
    LengthMismatch { original: usize, output: usize },
    #[error("bin assignment has {bins} entries for {data} values")]
    BinsLength { bins: usize, data: usize },
    #[error(
        "shifted input bins span {min:?}..={max:?}, expected {expected_min}..={expected_max}"
    )]
    InputBinsRange {
        min: Option<i32>,
        max: Option<i32>,
        expected_min: i32,
        expected_max: i32,
    },
    #[error("output bins span {min:?}..={max:?}, expected within 0..{nbins}")]
    OutputBinsRange {
        min: Option<i32>,
        max: Option<i32>,
        nbins: usize,
    },
    #[error("boundary replica {index} differs: head {head} vs tail {tail}")]
    BoundaryReplicaMismatch { index: usize, head: f32, tail: f32 },
    #[error("bin offset overflows i32 (maximum bin {max})")]
    BinOverflow { max: i32 },
    #[error("boundary size {boundary_size} exceeds sequence length {len}")]
    BoundaryTooLarge { boundary_size: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DistributorError {
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionViolation),
    #[error("pretrained run requested but no checkpoint exists in {}", .directory.display())]
    MissingCheckpoint { directory: PathBuf },
    #[error("checkpoint: {0}")]
    Checkpoint(CheckpointError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("configuration: {0}")]
    Config(#[from] RunConfigError),
    #[error("metrics: {0}")]
    Metrics(#[from] WriterError),
    #[error("invalid slice data: {reason}")]
    InvalidSlice { reason: String },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode slice data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CheckpointError> for DistributorError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Missing { directory } => Self::MissingCheckpoint { directory },
            other => Self::Checkpoint(other),
        }
    }
}
