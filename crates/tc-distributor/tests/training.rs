// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use tc_config::RunConfig;
use tc_distributor::{
    build_distributor, optimize_slice, shift_boundary_bins, AffineDenormalizer, Architecture,
    ArchitectureConfig, DistributorError, DistributorSettings, LossComposer, LossWeights,
    PreconditionViolation, RzSlice, TrainingState, TriggerCellDistributor,
};
use tc_metrics::{JsonlSummaryWriter, MemorySummaryWriter, MetricValue, SummaryEvent};
use tc_nn::{io::read_bincode, Module};
use tempfile::tempdir;

// Eight cells over four bins on [0, 1); the first cell replicates the last.
const VALUES: [f32; 8] = [0.9, 0.1, 0.3, 0.4, 0.6, 0.7, 0.8, 0.9];
const BINS: [i32; 8] = [3, 0, 1, 1, 2, 2, 3, 3];

fn settings(dir: &std::path::Path, pretrained: bool) -> DistributorSettings {
    DistributorSettings {
        boundary_size: 1,
        window_size: 2,
        nbins_phi: 4,
        phi_bounds: (0.0, 1.0),
        learning_rate: 1e-2,
        pretrained,
        checkpoint_dir: dir.to_path_buf(),
        max_to_keep: 5,
        loss_weights: LossWeights::new(1.0, 0.1, 1.0, 1.0),
    }
}

fn network(seed: u64) -> Architecture {
    Architecture::new(
        ArchitectureConfig {
            input_len: VALUES.len(),
            hidden_units: 16,
            conv_filters: 4,
            kernel_size: 3,
        },
        Some(seed),
    )
    .unwrap()
}

fn distributor(dir: &std::path::Path, pretrained: bool) -> TriggerCellDistributor<Architecture> {
    TriggerCellDistributor::new(VALUES.to_vec(), &BINS, network(7), settings(dir, pretrained))
        .unwrap()
}

#[test]
fn worked_example_shift_and_range_check() {
    let bins = [0, 0, 1, 1, 2, 2, 3, 3, 0, 0];
    assert_eq!(
        shift_boundary_bins(&bins, 2).unwrap(),
        vec![-4, -4, 1, 1, 2, 2, 3, 3, 0, 0]
    );

    // The shifted minimum is -4 while a window of 3 requires -2, so the
    // composer refuses to evaluate this slice.
    let composer = LossComposer::new(&bins, 2, 3, 4, (0.0, 4.0)).unwrap();
    let data = [0.5, 0.5, 1.5, 1.5, 2.5, 2.5, 3.5, 3.5, 0.5, 0.5];
    let err = composer
        .compose(&data, &data, LossWeights::default())
        .unwrap_err();
    assert!(matches!(
        err,
        DistributorError::Precondition(PreconditionViolation::InputBinsRange {
            min: Some(-4),
            expected_min: -2,
            ..
        })
    ));
}

#[test]
fn training_reduces_the_objective() {
    let dir = tempdir().unwrap();
    let mut tcd = distributor(dir.path(), false);
    let post = AffineDenormalizer::identity();
    let mut writer = MemorySummaryWriter::new();
    let summary = optimize_slice(&mut tcd, &post, &mut writer, 80, 1000).unwrap();

    let totals: Vec<f64> = writer
        .tagged("total")
        .map(|event| match event.value {
            MetricValue::Scalar(v) => v,
            _ => panic!("total must be a scalar"),
        })
        .collect();
    assert_eq!(totals.len(), 80);
    assert!(
        totals[79] < totals[0],
        "objective went from {} to {}",
        totals[0],
        totals[79]
    );
    assert_eq!(summary.final_prediction.len(), VALUES.len());
    assert_eq!(summary.checkpoints_written, 1, "only epoch 0 hits the cadence");
}

#[test]
fn checkpoint_holds_the_state_before_the_update() {
    let dir = tempdir().unwrap();
    let mut tcd = distributor(dir.path(), false);
    let initial = tcd.network().state_dict().unwrap();
    let outcome = tcd.train_step(&AffineDenormalizer::identity(), true).unwrap();

    let latest = tcd.checkpoints().latest().unwrap();
    let saved: TrainingState = read_bincode(&latest).unwrap();
    assert_eq!(saved.optimizer.step, 0);
    let saved = saved.model.into_state().unwrap();
    assert_eq!(saved, initial);
    let updated: std::collections::HashMap<_, _> = outcome.parameters.into_iter().collect();
    assert_ne!(saved, updated);
}

#[test]
fn pretrained_run_resumes_without_saving() {
    let dir = tempdir().unwrap();
    let post = AffineDenormalizer::identity();
    let mut first = distributor(dir.path(), false);
    first.train_step(&post, false).unwrap();
    first.save_checkpoint().unwrap();
    let trained = first.network().state_dict().unwrap();

    let mut resumed = TriggerCellDistributor::new(
        VALUES.to_vec(),
        &BINS,
        network(1234),
        settings(dir.path(), true),
    )
    .unwrap();
    let counter = resumed.checkpoints().index().counter;
    resumed.train_step(&post, true).unwrap();
    assert_eq!(resumed.checkpoints().index().counter, counter);
    assert_eq!(resumed.optimizer().iterations(), 2);
    assert_ne!(resumed.network().state_dict().unwrap(), trained);
}

#[test]
fn retention_keeps_the_newest_checkpoints() {
    let dir = tempdir().unwrap();
    let mut cfg = settings(dir.path(), false);
    cfg.max_to_keep = 2;
    let mut tcd = TriggerCellDistributor::new(VALUES.to_vec(), &BINS, network(7), cfg).unwrap();
    let mut writer = MemorySummaryWriter::new();
    optimize_slice(&mut tcd, &AffineDenormalizer::identity(), &mut writer, 5, 1).unwrap();
    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.starts_with("ckpt-"))
        .collect();
    assert_eq!(files.len(), 2);
    assert_eq!(tcd.checkpoints().index().all, vec!["ckpt-4.bin", "ckpt-5.bin"]);
}

#[test]
fn broken_replicas_abort_before_the_update() {
    let dir = tempdir().unwrap();
    let mut values = VALUES;
    values[7] = 0.95;
    let mut tcd =
        TriggerCellDistributor::new(values.to_vec(), &BINS, network(7), settings(dir.path(), false))
            .unwrap();
    let before = tcd.network().state_dict().unwrap();
    let err = tcd
        .train_step(&AffineDenormalizer::identity(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        DistributorError::Precondition(PreconditionViolation::BoundaryReplicaMismatch { .. })
    ));
    assert_eq!(tcd.optimizer().iterations(), 0);
    assert_eq!(tcd.network().state_dict().unwrap(), before);
}

#[test]
fn driver_stops_at_the_first_failure() {
    let dir = tempdir().unwrap();
    let mut tcd = distributor(dir.path(), true);
    let mut writer = MemorySummaryWriter::new();
    let err = optimize_slice(&mut tcd, &AffineDenormalizer::identity(), &mut writer, 10, 20)
        .unwrap_err();
    assert!(matches!(err, DistributorError::MissingCheckpoint { .. }));
    assert!(writer.events().is_empty());
}

#[test]
fn run_config_builds_a_working_distributor() {
    let dir = tempdir().unwrap();
    let config: RunConfig = serde_json::from_value(serde_json::json!({
        "MinPhi": 0.0,
        "MaxPhi": 2.0,
        "NbinsPhi": 4,
        "MinROverZ": 0.07,
        "MaxROverZ": 0.52,
        "NbinsRz": 42,
        "WindowSize": 2,
        "KernelSize": 3,
        "Epochs": 3,
        "HiddenUnits": 8,
        "ConvFilters": 2,
        "Seed": 5,
        "CheckpointDir": dir.path().join("ckpt"),
        "LogDir": dir.path().join("logs"),
    }))
    .unwrap();
    config.validate().unwrap();
    let slice = RzSlice {
        values: VALUES.to_vec(),
        bins: BINS.iter().map(|&b| b as f32).collect(),
        boundary_size: 1,
    };
    let mut tcd = build_distributor(&config, &slice).unwrap();
    let post = AffineDenormalizer::from_phi_bounds(config.phi_bounds());
    let path = {
        let mut writer = JsonlSummaryWriter::create_in(&config.log_dir).unwrap();
        optimize_slice(&mut tcd, &post, &mut writer, config.epochs, config.checkpoint_every)
            .unwrap();
        writer.path().to_path_buf()
    };
    let events: Vec<SummaryEvent> = fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    // four terms, their total and six gradient histograms per epoch
    assert_eq!(events.len(), 3 * (5 + 6));
    assert!(events.iter().any(|e| e.tag == "dense2__weight_grads"));
    assert!(dir.path().join("ckpt").join("ckpt-1.bin").exists());
}
