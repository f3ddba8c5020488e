// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::Module;
use crate::{PureResult, TensorError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First and second moment estimates for one parameter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub m: Vec<f32>,
    pub v: Vec<f32>,
}

/// Serializable optimiser state, persisted alongside the parameters in
/// checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub step: u64,
    pub moments: HashMap<String, Moments>,
}

/// Adaptive moment estimation with a fixed learning rate and bias-corrected
/// step size.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    state: AdamState,
}

impl Adam {
    /// Creates an optimiser with `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-7`.
    pub fn new(learning_rate: f32) -> PureResult<Self> {
        if learning_rate <= 0.0 || !learning_rate.is_finite() {
            return Err(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            });
        }
        Ok(Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1.0e-7,
            state: AdamState::default(),
        })
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Number of updates applied so far.
    pub fn iterations(&self) -> u64 {
        self.state.step
    }

    pub fn state(&self) -> &AdamState {
        &self.state
    }

    /// Replaces the moment estimates, e.g. after restoring a checkpoint.
    pub fn load_state(&mut self, state: AdamState) {
        self.state = state;
    }

    /// Applies one update to every parameter of `module` using its accumulated
    /// gradient, then clears the accumulators. Parameters without a gradient
    /// are treated as having a zero gradient.
    pub fn step<M: Module + ?Sized>(&mut self, module: &mut M) -> PureResult<()> {
        self.state.step += 1;
        let t = self.state.step as i32;
        let lr_t = self.learning_rate * (1.0 - self.beta2.powi(t)).sqrt()
            / (1.0 - self.beta1.powi(t));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let moments = &mut self.state.moments;

        module.visit_parameters_mut(&mut |param| {
            let grad = param.gradient_or_zeros()?;
            let len = grad.len();
            let entry = moments
                .entry(param.name().to_string())
                .or_insert_with(|| Moments {
                    m: vec![0.0; len],
                    v: vec![0.0; len],
                });
            if entry.m.len() != len || entry.v.len() != len {
                return Err(TensorError::DataLength {
                    expected: len,
                    got: entry.m.len(),
                });
            }
            let values = param.value_mut().data_mut();
            for (i, &g) in grad.data().iter().enumerate() {
                entry.m[i] = beta1 * entry.m[i] + (1.0 - beta1) * g;
                entry.v[i] = beta2 * entry.v[i] + (1.0 - beta2) * g * g;
                values[i] -= lr_t * entry.m[i] / (entry.v[i].sqrt() + epsilon);
            }
            param.zero_gradient();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::linear::Linear;
    use crate::loss::{Loss, SumSquaredError};
    use crate::Tensor;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_non_positive_learning_rate() {
        assert!(matches!(
            Adam::new(0.0),
            Err(TensorError::NonPositiveLearningRate { .. })
        ));
    }

    #[test]
    fn first_step_moves_each_weight_by_learning_rate() {
        let mut layer = Linear::new("fc", 2, 1, Some(3)).unwrap();
        let before = layer.weight().value().clone();
        let input = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        layer.backward(&input, &grad).unwrap();

        let mut adam = Adam::new(0.1).unwrap();
        adam.step(&mut layer).unwrap();
        assert_eq!(adam.iterations(), 1);

        // bias-corrected first update has magnitude ~lr with the gradient's sign
        let after = layer.weight().value();
        assert_abs_diff_eq!(after.data()[0], before.data()[0] - 0.1, epsilon = 1e-4);
        assert_abs_diff_eq!(after.data()[1], before.data()[1] + 0.1, epsilon = 1e-4);
        assert_eq!(
            layer.weight().gradient().unwrap().squared_l2_norm(),
            0.0,
            "accumulators are cleared after the update"
        );
    }

    #[test]
    fn repeated_steps_reduce_a_quadratic_loss() {
        let mut layer = Linear::new("fc", 3, 2, Some(9)).unwrap();
        let input = Tensor::from_vec(1, 3, vec![0.5, -0.2, 0.8]).unwrap();
        let target = Tensor::from_vec(1, 2, vec![3.0, -3.0]).unwrap();
        let mut loss = SumSquaredError::new();
        let mut adam = Adam::new(0.05).unwrap();

        let initial = loss
            .forward(&layer.forward(&input).unwrap(), &target)
            .unwrap()
            .data()[0];
        for _ in 0..100 {
            let out = layer.forward(&input).unwrap();
            let grad = loss.backward(&out, &target).unwrap();
            layer.backward(&input, &grad).unwrap();
            adam.step(&mut layer).unwrap();
        }
        let fin = loss
            .forward(&layer.forward(&input).unwrap(), &target)
            .unwrap()
            .data()[0];
        assert!(fin < initial * 0.2, "loss {initial} -> {fin}");
        assert_eq!(adam.state().moments.len(), 2);
    }
}
