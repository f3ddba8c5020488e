// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::data::Postprocess;
use crate::error::DistributorError;
use crate::loss::{ConstantSchedule, LossComposer, LossSchedule, LossTerms, LossWeights};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tc_config::RunConfig;
use tc_metrics::Mean;
use tc_nn::{Adam, AdamState, CheckpointManager, Module, ModuleSnapshot};
use tc_tensor::Tensor;
use tracing::{debug, trace, warn};

/// Run parameters of one distributor.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributorSettings {
    pub boundary_size: usize,
    pub window_size: usize,
    pub nbins_phi: usize,
    pub phi_bounds: (f32, f32),
    pub learning_rate: f32,
    pub pretrained: bool,
    pub checkpoint_dir: PathBuf,
    pub max_to_keep: usize,
    pub loss_weights: LossWeights,
}

impl DistributorSettings {
    pub fn from_run(config: &RunConfig, boundary_size: usize) -> Self {
        Self {
            boundary_size,
            window_size: config.window_size,
            nbins_phi: config.nbins_phi,
            phi_bounds: config.phi_bounds(),
            learning_rate: config.learning_rate,
            pretrained: config.pretrained,
            checkpoint_dir: config.checkpoint_dir.clone(),
            max_to_keep: config.max_to_keep,
            loss_weights: LossWeights::from(config.loss_weights),
        }
    }
}

/// Whether the first step (and its optional restore) has happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Active,
}

/// Phases a training step moves through, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPhase {
    Idle,
    Restore,
    Checkpoint,
    Forward,
    Loss,
    Backward,
    Update,
    Done,
}

/// Whole-state snapshot written to the checkpoint directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingState {
    pub model: ModuleSnapshot,
    pub optimizer: AdamState,
}

/// Everything a step hands back for logging.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub losses: LossTerms,
    /// Postprocessed network output.
    pub prediction: Vec<f32>,
    /// Network output before postprocessing.
    pub raw_prediction: Vec<f32>,
    pub unique_outbins: Vec<i32>,
    /// `(name, gradient)` of the objective, captured before the update.
    pub gradients: Vec<(String, Tensor)>,
    /// `(name, value)` after the update.
    pub parameters: Vec<(String, Tensor)>,
}

/// Owns the network, optimiser and derived bin state for one R/z slice and
/// runs one optimisation step at a time.
pub struct TriggerCellDistributor<M: Module> {
    indata: Tensor,
    composer: LossComposer,
    network: M,
    optimizer: Adam,
    checkpoints: CheckpointManager,
    train_loss: Mean,
    schedule: Box<dyn LossSchedule>,
    initial_weights: LossWeights,
    weights: LossWeights,
    pretrained: bool,
    lifecycle: Lifecycle,
    phase: StepPhase,
}

impl<M: Module> TriggerCellDistributor<M> {
    /// Shifts `inbins` once and prepares the optimiser and checkpoint store.
    pub fn new(
        indata: Vec<f32>,
        inbins: &[i32],
        network: M,
        settings: DistributorSettings,
    ) -> Result<Self, DistributorError> {
        let composer = LossComposer::new(
            inbins,
            settings.boundary_size,
            settings.window_size,
            settings.nbins_phi,
            settings.phi_bounds,
        )?;
        let indata = Tensor::row(indata)?;
        let optimizer = Adam::new(settings.learning_rate)?;
        let checkpoints = CheckpointManager::open(&settings.checkpoint_dir, settings.max_to_keep)?;
        debug!(
            cells = indata.len(),
            boundary_size = composer.boundary_size(),
            boundary_width = composer.boundary_width(),
            pretrained = settings.pretrained,
            "created trigger cell distributor"
        );
        Ok(Self {
            indata,
            composer,
            network,
            optimizer,
            checkpoints,
            train_loss: Mean::new(),
            schedule: Box::new(ConstantSchedule),
            initial_weights: settings.loss_weights,
            weights: settings.loss_weights,
            pretrained: settings.pretrained,
            lifecycle: Lifecycle::Uninitialized,
            phase: StepPhase::Idle,
        })
    }

    pub fn with_schedule<S: LossSchedule + 'static>(mut self, schedule: S) -> Self {
        self.schedule = Box::new(schedule);
        self
    }

    pub fn composer(&self) -> &LossComposer {
        &self.composer
    }

    pub fn network(&self) -> &M {
        &self.network
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn loss_weights(&self) -> LossWeights {
        self.weights
    }

    /// Mean objective of the latest step. The metric is cleared at the start
    /// of every step, so it never spans more than one.
    pub fn train_loss(&self) -> f64 {
        self.train_loss.result()
    }

    /// Applies the loss schedule for `epoch` and returns the weights in effect.
    pub fn adapt_loss_parameters(&mut self, epoch: usize) -> LossWeights {
        let next = self.schedule.weights(epoch, self.initial_weights);
        if next != self.weights {
            debug!(epoch, ?next, "loss weights changed");
        }
        self.weights = next;
        next
    }

    fn enter(&mut self, phase: StepPhase) {
        trace!(?phase, "step phase");
        self.phase = phase;
    }

    /// Persists network and optimiser state as the next numbered checkpoint.
    pub fn save_checkpoint(&mut self) -> Result<PathBuf, DistributorError> {
        let state = TrainingState {
            model: ModuleSnapshot::from_module(&self.network)?,
            optimizer: self.optimizer.state().clone(),
        };
        Ok(self.checkpoints.save(&state)?)
    }

    /// Loads the latest checkpoint into the network and optimiser.
    pub fn restore_checkpoint(&mut self) -> Result<(), DistributorError> {
        let state: TrainingState = self.checkpoints.restore_latest()?;
        state.model.apply_to(&mut self.network)?;
        self.optimizer.load_state(state.optimizer);
        Ok(())
    }

    /// Runs one optimisation step.
    ///
    /// On the first call of a pretrained run the latest checkpoint is
    /// restored. When `save` is set on a run that is not pretrained, the
    /// state is checkpointed before the forward pass, so the snapshot holds
    /// the parameters from before this step's update. A failed step leaves
    /// the phase at [`StepPhase::Idle`].
    pub fn train_step(
        &mut self,
        postprocess: &dyn Postprocess,
        save: bool,
    ) -> Result<StepOutcome, DistributorError> {
        let outcome = self.run_step(postprocess, save);
        if let Err(err) = &outcome {
            warn!(error = %err, phase = ?self.phase, "aborting training step");
            self.enter(StepPhase::Idle);
        }
        outcome
    }

    fn run_step(
        &mut self,
        postprocess: &dyn Postprocess,
        save: bool,
    ) -> Result<StepOutcome, DistributorError> {
        self.train_loss.reset();

        if self.lifecycle == Lifecycle::Uninitialized {
            if self.pretrained {
                self.enter(StepPhase::Restore);
                self.restore_checkpoint()?;
            }
            self.lifecycle = Lifecycle::Active;
        }

        if save && !self.pretrained {
            self.enter(StepPhase::Checkpoint);
            self.save_checkpoint()?;
        }

        self.enter(StepPhase::Forward);
        let raw = self.network.forward(&self.indata)?;
        let prediction = postprocess.postprocess(raw.data());
        let original = postprocess.postprocess(self.indata.data());

        self.enter(StepPhase::Loss);
        let weights = self.weights;
        let composed = self.composer.compose(&original, &prediction, weights)?;
        let objective = composed.terms.total();

        self.enter(StepPhase::Backward);
        let grad_prediction = self
            .composer
            .gradient(&original, &prediction, &composed, weights)?;
        let grad_raw = postprocess.backward(raw.data(), &grad_prediction);
        self.network.zero_accumulators()?;
        self.network
            .backward(&self.indata, &Tensor::row(grad_raw)?)?;
        let gradients = self.network.named_gradients()?;

        self.enter(StepPhase::Update);
        self.optimizer.step(&mut self.network)?;
        self.train_loss.update(objective as f64);

        self.enter(StepPhase::Done);
        Ok(StepOutcome {
            losses: composed.terms,
            prediction,
            raw_prediction: raw.into_vec(),
            unique_outbins: composed.unique_outbins,
            gradients,
            parameters: self.network.named_parameters()?,
        })
    }
}
