// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Standard deviation of a unit normal truncated at two sigmas.
const TRUNCATED_NORMAL_STD: f32 = 0.879_625_66;

fn validate_positive(value: usize) -> PureResult<()> {
    if value == 0 {
        return Err(TensorError::InvalidDimensions {
            rows: 1,
            cols: value,
        });
    }
    Ok(())
}

fn kernel_span(in_channels: usize, kernel: usize) -> usize {
    in_channels * kernel
}

/// One-dimensional convolution (stride 1) operating on
/// `(batch, channels * width)` tensors laid out channel-major.
///
/// Inputs are zero padded so that the output width equals the input width.
/// Odd leftovers go to the right edge.
#[derive(Debug)]
pub struct Conv1d {
    weight: Parameter,
    bias: Parameter,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    pad_left: usize,
    pad_right: usize,
}

impl Conv1d {
    /// Creates a convolution with LeCun-normal kernels and zero bias.
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        validate_positive(in_channels)?;
        validate_positive(out_channels)?;
        validate_positive(kernel_size)?;
        let name = name.into();
        let span = kernel_span(in_channels, kernel_size);
        let std = (1.0 / span as f32).sqrt() / TRUNCATED_NORMAL_STD;
        let weight = Tensor::random_truncated_normal(
            out_channels,
            span,
            std,
            seed,
            &format!("{name}::weight"),
        )?;
        let bias = Tensor::zeros(1, out_channels)?;
        let total = kernel_size - 1;
        let (pad_left, pad_right) = (total / 2, total - total / 2);
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
            in_channels,
            out_channels,
            kernel_size,
            pad_left,
            pad_right,
        })
    }

    /// Number of output channels (filters).
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn infer_width(&self, cols: usize) -> PureResult<usize> {
        if cols % self.in_channels != 0 {
            return Err(TensorError::ShapeMismatch {
                left: (1, cols),
                right: (1, self.in_channels),
            });
        }
        Ok(cols / self.in_channels)
    }

    /// Output width produced for an input of `input_width` samples.
    pub fn output_width(&self, input_width: usize) -> PureResult<usize> {
        let padded = input_width + self.pad_left + self.pad_right;
        if padded < self.kernel_size {
            return Err(TensorError::InvalidDimensions {
                rows: input_width,
                cols: self.kernel_size,
            });
        }
        Ok(padded - self.kernel_size + 1)
    }

    /// Maps output position `ow` and tap `k` onto an input index, or `None`
    /// when the tap lands in the zero padding.
    fn tap(&self, ow: usize, k: usize, width: usize) -> Option<usize> {
        let pos = ow + k;
        if pos < self.pad_left {
            return None;
        }
        let idx = pos - self.pad_left;
        (idx < width).then_some(idx)
    }
}

impl Module for Conv1d {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let width = self.infer_width(cols)?;
        let out_width = self.output_width(width)?;
        let mut out = Tensor::zeros(batch, self.out_channels * out_width)?;
        let weight_data = self.weight.value().data();
        let bias_data = self.bias.value().data();
        let span = kernel_span(self.in_channels, self.kernel_size);
        let out_cols = out.shape().1;
        let out_data = out.data_mut();
        for b in 0..batch {
            let row = &input.data()[b * cols..(b + 1) * cols];
            let out_row = &mut out_data[b * out_cols..(b + 1) * out_cols];
            for oc in 0..self.out_channels {
                let weight_row = &weight_data[oc * span..(oc + 1) * span];
                for ow in 0..out_width {
                    let mut acc = bias_data[oc];
                    for ic in 0..self.in_channels {
                        let channel_offset = ic * width;
                        for k in 0..self.kernel_size {
                            if let Some(idx) = self.tap(ow, k, width) {
                                acc += row[channel_offset + idx]
                                    * weight_row[ic * self.kernel_size + k];
                            }
                        }
                    }
                    out_row[oc * out_width + ow] = acc;
                }
            }
        }
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let width = self.infer_width(cols)?;
        let out_width = self.output_width(width)?;
        if grad_output.shape() != (batch, self.out_channels * out_width) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (batch, self.out_channels * out_width),
            });
        }
        let span = kernel_span(self.in_channels, self.kernel_size);
        let mut grad_weight = Tensor::zeros(self.out_channels, span)?;
        let mut grad_bias = vec![0.0f32; self.out_channels];
        let mut grad_input = Tensor::zeros(batch, cols)?;
        let weight_data = self.weight.value().data();
        let grad_out_cols = grad_output.shape().1;
        {
            let grad_weight_data = grad_weight.data_mut();
            let grad_input_data = grad_input.data_mut();
            for b in 0..batch {
                let row = &input.data()[b * cols..(b + 1) * cols];
                let grad_row = &grad_output.data()[b * grad_out_cols..(b + 1) * grad_out_cols];
                let grad_in_row = &mut grad_input_data[b * cols..(b + 1) * cols];
                for oc in 0..self.out_channels {
                    let weight_row = &weight_data[oc * span..(oc + 1) * span];
                    for ow in 0..out_width {
                        let go = grad_row[oc * out_width + ow];
                        grad_bias[oc] += go;
                        for ic in 0..self.in_channels {
                            let channel_offset = ic * width;
                            for k in 0..self.kernel_size {
                                let Some(idx) = self.tap(ow, k, width) else {
                                    continue;
                                };
                                let weight_idx = ic * self.kernel_size + k;
                                grad_weight_data[oc * span + weight_idx] +=
                                    go * row[channel_offset + idx];
                                grad_in_row[channel_offset + idx] += go * weight_row[weight_idx];
                            }
                        }
                    }
                }
            }
        }
        let inv_batch = 1.0 / batch as f32;
        let grad_weight = grad_weight.scale(inv_batch)?;
        let grad_bias = Tensor::from_vec(1, self.out_channels, grad_bias)?.scale(inv_batch)?;
        self.weight.accumulate_euclidean(&grad_weight)?;
        self.bias.accumulate_euclidean(&grad_bias)?;
        Ok(grad_input)
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
