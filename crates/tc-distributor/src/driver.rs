// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::architecture::{Architecture, ArchitectureConfig};
use crate::data::{Postprocess, RzSlice};
use crate::distributor::{DistributorSettings, TriggerCellDistributor};
use crate::error::DistributorError;
use crate::logs::{save_gradient_logs, save_scalar_logs};
use crate::loss::LossTerms;
use tc_config::RunConfig;
use tc_metrics::SummaryWriter;
use tc_nn::Module;
use tracing::info;

/// Summary of a finished run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub epochs: usize,
    pub checkpoints_written: usize,
    pub final_losses: Option<LossTerms>,
    pub final_prediction: Vec<f32>,
}

/// Builds the distributor for `slice` with the network described by `config`.
pub fn build_distributor(
    config: &RunConfig,
    slice: &RzSlice,
) -> Result<TriggerCellDistributor<Architecture>, DistributorError> {
    let inbins = slice.integer_bins()?;
    let network = Architecture::new(
        ArchitectureConfig {
            input_len: slice.values.len(),
            hidden_units: config.hidden_units,
            conv_filters: config.conv_filters,
            kernel_size: config.kernel_size,
        },
        config.seed,
    )?;
    TriggerCellDistributor::new(
        slice.values.clone(),
        &inbins,
        network,
        DistributorSettings::from_run(config, slice.boundary_size),
    )
}

/// Trains one slice for `epochs` steps.
///
/// Epochs that are multiples of `checkpoint_every` request a checkpoint. The
/// first error stops the run.
pub fn optimize_slice<M, W>(
    distributor: &mut TriggerCellDistributor<M>,
    postprocess: &dyn Postprocess,
    writer: &mut W,
    epochs: usize,
    checkpoint_every: usize,
) -> Result<RunSummary, DistributorError>
where
    M: Module,
    W: SummaryWriter + ?Sized,
{
    let mut summary = RunSummary {
        epochs,
        ..RunSummary::default()
    };
    for epoch in 0..epochs {
        let should_save = checkpoint_every > 0 && epoch % checkpoint_every == 0;
        distributor.adapt_loss_parameters(epoch);
        let before = distributor.checkpoints().index().counter;
        let outcome = distributor.train_step(postprocess, should_save)?;
        if distributor.checkpoints().index().counter != before {
            summary.checkpoints_written += 1;
        }

        save_scalar_logs(writer, outcome.losses.iter(), epoch)?;
        save_gradient_logs(writer, &outcome.gradients, &outcome.parameters, epoch)?;

        info!(
            epoch,
            total = outcome.losses.total(),
            equality = outcome.losses.equality_loss,
            variance = outcome.losses.local_variance_loss,
            wasserstein = outcome.losses.wasserstein_loss,
            boundary = outcome.losses.boundary_loss,
            "epoch finished"
        );
        summary.final_losses = Some(outcome.losses);
        summary.final_prediction = outcome.prediction;
    }
    writer.flush()?;
    Ok(summary)
}
