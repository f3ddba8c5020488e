use crate::layered::{ConfigLayering, LayeredConfig, LayeredConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable parameters of one optimisation run. Keys follow the flat
/// PascalCase mapping used by the experiment configuration files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunConfig {
    pub min_phi: f32,
    pub max_phi: f32,
    pub nbins_phi: usize,
    pub min_r_over_z: f32,
    pub max_r_over_z: f32,
    pub nbins_rz: usize,
    /// Number of phi bins that enter each local variance window.
    pub window_size: usize,
    pub kernel_size: usize,
    pub epochs: usize,
    #[serde(default)]
    pub pretrained: bool,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_max_to_keep")]
    pub max_to_keep: usize,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// `(equality, local variance, wasserstein, boundary)` weights.
    #[serde(default = "default_loss_weights")]
    pub loss_weights: [f32; 4],
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub chosen_layer: usize,
    #[serde(default = "default_hidden_units")]
    pub hidden_units: usize,
    #[serde(default = "default_conv_filters")]
    pub conv_filters: usize,
}

fn default_learning_rate() -> f32 {
    1.0e-4
}

fn default_checkpoint_every() -> usize {
    20
}

fn default_max_to_keep() -> usize {
    5
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("data/test_model/checkpoints")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs/gradient_tape")
}

fn default_loss_weights() -> [f32; 4] {
    [1.0, 0.0, 1.0, 1.0]
}

fn default_hidden_units() -> usize {
    200
}

fn default_conv_filters() -> usize {
    16
}

#[derive(Debug, thiserror::Error)]
pub enum RunConfigError {
    #[error(transparent)]
    Layered(#[from] LayeredConfigError),
    #[error("failed to decode run configuration: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid run configuration field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl RunConfig {
    /// Loads, merges and validates the configured layers.
    pub fn load(layering: ConfigLayering) -> Result<Self, RunConfigError> {
        let layered = LayeredConfig::load(layering)?;
        let config: RunConfig = layered.deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter combinations the distributor cannot run with.
    pub fn validate(&self) -> Result<(), RunConfigError> {
        let invalid = |field, reason| Err(RunConfigError::Invalid { field, reason });
        if self.nbins_phi == 0 {
            return invalid("NbinsPhi", "must be positive");
        }
        if self.window_size == 0 {
            return invalid("WindowSize", "must be positive");
        }
        if self.kernel_size == 0 {
            return invalid("KernelSize", "must be positive");
        }
        if !(self.min_phi < self.max_phi) {
            return invalid("MinPhi", "must be smaller than MaxPhi");
        }
        if !(self.min_r_over_z < self.max_r_over_z) {
            return invalid("MinROverZ", "must be smaller than MaxROverZ");
        }
        if self.checkpoint_every == 0 {
            return invalid("CheckpointEvery", "must be positive");
        }
        if self.max_to_keep == 0 {
            return invalid("MaxToKeep", "must be positive");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("LearningRate", "must be positive and finite");
        }
        if self.hidden_units == 0 || self.conv_filters == 0 {
            return invalid("HiddenUnits", "layer widths must be positive");
        }
        Ok(())
    }

    /// Phi range used for fixed-width histogram binning.
    pub fn phi_bounds(&self) -> (f32, f32) {
        (self.min_phi, self.max_phi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const BASE: &str = r#"
        MinPhi = -3.14159
        MaxPhi = 3.14159
        NbinsPhi = 216
        MinROverZ = 0.076
        MaxROverZ = 0.58
        NbinsRz = 42
        WindowSize = 3
        KernelSize = 10
        Epochs = 100
    "#;

    #[test]
    fn defaults_fill_optional_keys() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        fs::write(&base, BASE).unwrap();
        let config = RunConfig::load(ConfigLayering::default().with_base(&base)).unwrap();
        assert_eq!(config.nbins_phi, 216);
        assert!(!config.pretrained);
        assert_eq!(config.checkpoint_every, 20);
        assert_eq!(config.max_to_keep, 5);
        assert_eq!(config.loss_weights, [1.0, 0.0, 1.0, 1.0]);
        assert!((config.learning_rate - 1.0e-4).abs() < f32::EPSILON);
    }

    #[test]
    fn run_override_is_applied_before_validation() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        fs::write(&base, BASE).unwrap();
        let run = dir.path().join("run.json");
        fs::write(&run, r#"{"WindowSize": 0}"#).unwrap();
        let err = RunConfig::load(ConfigLayering::default().with_base(&base).with_run(&run))
            .unwrap_err();
        assert!(matches!(
            err,
            RunConfigError::Invalid {
                field: "WindowSize",
                ..
            }
        ));
    }

    #[test]
    fn missing_required_key_fails_to_decode() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        fs::write(&base, "MinPhi = 0.0\nMaxPhi = 1.0").unwrap();
        let err = RunConfig::load(ConfigLayering::default().with_base(&base)).unwrap_err();
        assert!(matches!(err, RunConfigError::Decode(_)));
    }
}
