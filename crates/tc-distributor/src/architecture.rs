// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use tc_nn::{Conv1d, Linear, Module, Parameter, PureResult, Relu, Selu, Tensor, TensorError};

/// Layer sizes of [`Architecture`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchitectureConfig {
    pub input_len: usize,
    pub hidden_units: usize,
    pub conv_filters: usize,
    pub kernel_size: usize,
}

/// Dense(relu) -> Conv1d(same, selu) -> Dense(selu).
///
/// The hidden dense output is read as a single-channel signal, convolved,
/// then flattened channel-major into the last dense layer. Input and output
/// are `(1, input_len)` rows.
#[derive(Debug)]
pub struct Architecture {
    config: ArchitectureConfig,
    dense1: Linear,
    conv1: Conv1d,
    dense2: Linear,
}

/// Intermediate outputs of one forward pass, kept for the backward pass.
struct Trace {
    hidden_pre: Tensor,
    hidden: Tensor,
    conv_pre: Tensor,
    conv: Tensor,
    output_pre: Tensor,
}

impl Architecture {
    pub fn new(config: ArchitectureConfig, seed: Option<u64>) -> PureResult<Self> {
        let ArchitectureConfig {
            input_len,
            hidden_units,
            conv_filters,
            kernel_size,
        } = config;
        Ok(Self {
            config,
            dense1: Linear::new("dense1", input_len, hidden_units, seed)?,
            conv1: Conv1d::new("conv1", 1, conv_filters, kernel_size, seed)?,
            dense2: Linear::new("dense2", hidden_units * conv_filters, input_len, seed)?,
        })
    }

    pub fn config(&self) -> ArchitectureConfig {
        self.config
    }

    fn check_input(&self, input: &Tensor) -> PureResult<()> {
        if input.shape() != (1, self.config.input_len) {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: (1, self.config.input_len),
            });
        }
        Ok(())
    }

    fn trace(&self, input: &Tensor) -> PureResult<Trace> {
        self.check_input(input)?;
        let hidden_pre = self.dense1.forward(input)?;
        let hidden = Relu::new().forward(&hidden_pre)?;
        let conv_pre = self.conv1.forward(&hidden)?;
        let conv = Selu::new().forward(&conv_pre)?;
        let output_pre = self.dense2.forward(&conv)?;
        Ok(Trace {
            hidden_pre,
            hidden,
            conv_pre,
            conv,
            output_pre,
        })
    }
}

impl Module for Architecture {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let trace = self.trace(input)?;
        Selu::new().forward(&trace.output_pre)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let trace = self.trace(input)?;
        let grad = Selu::new().backward(&trace.output_pre, grad_output)?;
        let grad = self.dense2.backward(&trace.conv, &grad)?;
        let grad = Selu::new().backward(&trace.conv_pre, &grad)?;
        let grad = self.conv1.backward(&trace.hidden, &grad)?;
        let grad = Relu::new().backward(&trace.hidden_pre, &grad)?;
        self.dense1.backward(input, &grad)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.dense1.visit_parameters(visitor)?;
        self.conv1.visit_parameters(visitor)?;
        self.dense2.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.dense1.visit_parameters_mut(visitor)?;
        self.conv1.visit_parameters_mut(visitor)?;
        self.dense2.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Architecture {
        Architecture::new(
            ArchitectureConfig {
                input_len: 6,
                hidden_units: 5,
                conv_filters: 3,
                kernel_size: 3,
            },
            Some(11),
        )
        .unwrap()
    }

    #[test]
    fn output_matches_input_length() {
        let net = small();
        let input = Tensor::row(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        assert_eq!(net.forward(&input).unwrap().shape(), (1, 6));
        let wrong = Tensor::row(vec![0.1; 5]).unwrap();
        assert!(net.forward(&wrong).is_err());
    }

    #[test]
    fn parameters_are_named_per_layer() {
        let net = small();
        let names: Vec<String> = net
            .named_parameters()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            [
                "dense1::weight",
                "dense1::bias",
                "conv1::weight",
                "conv1::bias",
                "dense2::weight",
                "dense2::bias"
            ]
        );
        let shapes: Vec<_> = net
            .named_parameters()
            .unwrap()
            .into_iter()
            .map(|(_, t)| t.shape())
            .collect();
        assert_eq!(shapes[4], (15, 6));
    }

    #[test]
    fn seeded_networks_are_reproducible() {
        let input = Tensor::row(vec![0.3; 6]).unwrap();
        let a = small().forward(&input).unwrap();
        let b = small().forward(&input).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn backward_fills_every_gradient() {
        let mut net = small();
        let input = Tensor::row(vec![0.9, -0.4, 0.3, 0.7, -0.1, 0.2]).unwrap();
        let grad = Tensor::row(vec![1.0; 6]).unwrap();
        net.backward(&input, &grad).unwrap();
        net.visit_parameters(&mut |param| {
            assert!(param.gradient().is_some(), "{} has no gradient", param.name());
            Ok(())
        })
        .unwrap();
    }
}
