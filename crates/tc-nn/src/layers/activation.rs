// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

fn check_shapes(input: &Tensor, grad_output: &Tensor) -> PureResult<()> {
    if input.shape() != grad_output.shape() {
        return Err(TensorError::ShapeMismatch {
            left: input.shape(),
            right: grad_output.shape(),
        });
    }
    Ok(())
}

/// Lightweight ReLU activation. The layer is stateless and therefore does not
/// participate in parameter visits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Relu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (rows, cols) = input.shape();
        let data = input.data().iter().map(|v| v.max(0.0)).collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        check_shapes(input, grad_output)?;
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .zip(grad_output.data().iter())
            .map(|(x, g)| if *x > 0.0 { *g } else { 0.0 })
            .collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

/// Scaled exponential linear unit, `scale * (x if x > 0 else alpha * (e^x - 1))`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Selu;

impl Selu {
    /// Creates a new SELU layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Selu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .map(|&x| {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp_m1()
                }
            })
            .collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        check_shapes(input, grad_output)?;
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .zip(grad_output.data().iter())
            .map(|(&x, &g)| {
                if x > 0.0 {
                    SELU_SCALE * g
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp() * g
                }
            })
            .collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn relu_forward_backward() {
        let mut relu = Relu::new();
        let input = Tensor::from_vec(1, 4, vec![-1.0, -0.5, 0.2, 1.5]).unwrap();
        let output = relu.forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 0.2, 1.5]);

        let grad_output = Tensor::from_vec(1, 4, vec![0.3, 0.4, 0.5, 0.6]).unwrap();
        let grad_input = relu.backward(&input, &grad_output).unwrap();
        assert_eq!(grad_input.data(), &[0.0, 0.0, 0.5, 0.6]);
    }

    #[test]
    fn selu_matches_closed_form() {
        let selu = Selu::new();
        let input = Tensor::from_vec(1, 3, vec![-1.0, 0.0, 2.0]).unwrap();
        let output = selu.forward(&input).unwrap();
        assert_abs_diff_eq!(output.data()[0], -1.111_330_7, epsilon = 1e-5);
        assert_abs_diff_eq!(output.data()[1], 0.0);
        assert_abs_diff_eq!(output.data()[2], 2.101_402, epsilon = 1e-5);
    }

    #[test]
    fn selu_backward_matches_finite_difference() {
        let mut selu = Selu::new();
        let h = 1e-3f32;
        for &x in &[-1.5f32, -0.2, 0.7] {
            let input = Tensor::from_vec(1, 1, vec![x]).unwrap();
            let plus = selu
                .forward(&Tensor::from_vec(1, 1, vec![x + h]).unwrap())
                .unwrap();
            let minus = selu
                .forward(&Tensor::from_vec(1, 1, vec![x - h]).unwrap())
                .unwrap();
            let numeric = (plus.data()[0] - minus.data()[0]) / (2.0 * h);
            let grad = selu
                .backward(&input, &Tensor::from_vec(1, 1, vec![1.0]).unwrap())
                .unwrap();
            assert_abs_diff_eq!(grad.data()[0], numeric, epsilon = 1e-2);
        }
    }
}
