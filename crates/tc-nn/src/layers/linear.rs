// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Fully-connected layer with Glorot-uniform weights and zero bias.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

impl Linear {
    /// Creates a new linear layer. `seed` pins the initialiser; `None`
    /// defers to the process determinism policy.
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = Tensor::random_uniform(
            input_dim,
            output_dim,
            -limit,
            limit,
            seed,
            &format!("{name}::weight"),
        )?;
        let bias = Tensor::zeros(1, output_dim)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weights),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a reference to the bias parameter.
    pub fn bias(&self) -> &Parameter {
        &self.bias
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.weight.value().shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        out.add_row_inplace(self.bias.value().data())?;
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        if input.shape().0 != grad_output.shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let batch = input.shape().0 as f32;
        let grad_w = input.transpose().matmul(grad_output)?.scale(1.0 / batch)?;
        self.weight.accumulate_euclidean(&grad_w)?;

        let summed = grad_output.sum_axis0();
        let grad_b = Tensor::from_vec(1, summed.len(), summed)?.scale(1.0 / batch)?;
        self.bias.accumulate_euclidean(&grad_b)?;

        let weight_t = self.weight.value().transpose();
        grad_output.matmul(&weight_t)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_forward_matches_manual() {
        let layer = Linear::new("fc", 3, 2, Some(5)).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        let mut expected = input.matmul(layer.weight.value()).unwrap();
        expected.add_row_inplace(layer.bias.value().data()).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn glorot_limit_bounds_initial_weights() {
        let layer = Linear::new("fc", 10, 6, Some(5)).unwrap();
        let limit = (6.0f32 / 16.0).sqrt();
        assert!(layer
            .weight()
            .value()
            .data()
            .iter()
            .all(|w| w.abs() <= limit));
        assert!(layer.bias().value().data().iter().all(|b| *b == 0.0));
    }

    #[test]
    fn linear_backward_populates_gradients() {
        let mut layer = Linear::new("fc", 2, 1, Some(5)).unwrap();
        let input = Tensor::from_vec(1, 2, vec![2.0, -1.0]).unwrap();
        let grad_out = Tensor::from_vec(1, 1, vec![0.5]).unwrap();
        let grad_in = layer.backward(&input, &grad_out).unwrap();
        assert_eq!(layer.weight().gradient().unwrap().data(), &[1.0, -0.5]);
        assert_eq!(layer.bias().gradient().unwrap().data(), &[0.5]);
        let w = layer.weight().value().data();
        assert_eq!(grad_in.data(), &[0.5 * w[0], 0.5 * w[1]]);
    }
}
