// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Normalization kernels: batch, layer, and RMS.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, resolve_axis,
    ExecutionContext, InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::Tensor;

fn infer_passthrough(
    op: &'static str,
    inputs: &[InferenceInput<'_>],
) -> Result<Vec<ValueInfo>, OpError> {
    if inputs.is_empty() {
        return Err(OpError::InvalidArgument {
            op,
            detail: "requires at least 1 input".into(),
        });
    }
    Ok(vec![ValueInfo::new(inputs[0].shape.clone(), inputs[0].dtype)])
}

// ── BatchNormalization ─────────────────────────────────────────

/// Per-channel affine normalization over NCHW input:
/// `y = γ·(x − μ)/√(σ² + ε) + β`.
///
/// Inputs: `x, scale, bias, mean, var`. The `fused_relu` attribute,
/// set by the BN→ReLU fusion, applies `max(0, ·)` to the result.
pub struct BatchNormalization {
    epsilon: f32,
    fused_relu: bool,
}

impl BatchNormalization {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            epsilon: attrs.get_f32("epsilon").unwrap_or(1e-5),
            fused_relu: attrs.get_i64("fused_relu").unwrap_or(0) != 0,
        }))
    }
}

impl Operator for BatchNormalization {
    fn name(&self) -> &'static str {
        "BatchNormalization"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("BatchNormalization", inputs, 5)?;
        expect_f32("BatchNormalization", inputs[0])?;
        let shape = inputs[0].shape();
        if shape.rank() < 2 {
            return Err(OpError::InvalidArgument {
                op: "BatchNormalization",
                detail: format!("input must have a channel dim, got {shape}"),
            });
        }
        let channels = shape.dims()[1];
        for (i, name) in ["scale", "bias", "mean", "var"].iter().enumerate() {
            let param = inputs[i + 1];
            expect_f32("BatchNormalization", param)?;
            if param.element_count() as i64 != channels {
                return Err(OpError::InvalidArgument {
                    op: "BatchNormalization",
                    detail: format!(
                        "{name} has {} elements, expected {channels}",
                        param.element_count()
                    ),
                });
            }
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        infer_passthrough("BatchNormalization", inputs)
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("BatchNormalization", outputs)?;
        expect_output_shape("BatchNormalization", &outputs[0], inputs[0].shape())?;

        let dims = inputs[0].shape().dims().to_vec();
        let channels = dims[1] as usize;
        let spatial: usize = dims[2..].iter().map(|&d| d.max(1) as usize).product();
        let batch = dims[0] as usize;

        let x = inputs[0].as_f32();
        let scale = inputs[1].as_f32();
        let bias = inputs[2].as_f32();
        let mean = inputs[3].as_f32();
        let var = inputs[4].as_f32();
        let out = outputs[0].as_f32_mut()?;

        for n in 0..batch {
            for c in 0..channels {
                let inv_std = 1.0 / (var[c] + self.epsilon).sqrt();
                let a = scale[c] * inv_std;
                let b = bias[c] - scale[c] * mean[c] * inv_std;
                let base = (n * channels + c) * spatial;
                for s in 0..spatial {
                    let mut y = a * x[base + s] + b;
                    if self.fused_relu && y < 0.0 {
                        y = 0.0;
                    }
                    out[base + s] = y;
                }
            }
        }
        Ok(())
    }
}

// ── LayerNormalization ─────────────────────────────────────────

/// Normalization over the trailing dims from `axis` (default −1):
/// `y = γ·(x − μ)/√(σ² + ε) + β`.
///
/// Inputs: `x, scale, bias`.
pub struct LayerNormalization {
    axis: i64,
    epsilon: f32,
}

impl LayerNormalization {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(-1),
            epsilon: attrs.get_f32("epsilon").unwrap_or(1e-5),
        }))
    }
}

impl Operator for LayerNormalization {
    fn name(&self) -> &'static str {
        "LayerNormalization"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("LayerNormalization", inputs, 3)?;
        for t in inputs.iter().take(3) {
            expect_f32("LayerNormalization", t)?;
        }
        let rank = inputs[0].shape().rank();
        let axis = resolve_axis("LayerNormalization", self.axis, rank)?;
        let norm_count: i64 = inputs[0].shape().dims()[axis..].iter().product();
        for (i, name) in ["scale", "bias"].iter().enumerate() {
            if inputs[i + 1].element_count() as i64 != norm_count {
                return Err(OpError::InvalidArgument {
                    op: "LayerNormalization",
                    detail: format!(
                        "{name} has {} elements, expected {norm_count}",
                        inputs[i + 1].element_count()
                    ),
                });
            }
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        infer_passthrough("LayerNormalization", inputs)
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("LayerNormalization", outputs)?;
        expect_output_shape("LayerNormalization", &outputs[0], inputs[0].shape())?;

        let dims = inputs[0].shape().dims().to_vec();
        let axis = resolve_axis("LayerNormalization", self.axis, dims.len())?;
        let inner: usize = dims[axis..].iter().map(|&d| d.max(1) as usize).product();
        let outer: usize = dims[..axis].iter().map(|&d| d.max(1) as usize).product();

        let x = inputs[0].as_f32();
        let scale = inputs[1].as_f32();
        let bias = inputs[2].as_f32();
        let out = outputs[0].as_f32_mut()?;

        for o in 0..outer {
            let row = &x[o * inner..(o + 1) * inner];
            let mean: f32 = row.iter().sum::<f32>() / inner as f32;
            let var: f32 =
                row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / inner as f32;
            let inv_std = 1.0 / (var + self.epsilon).sqrt();
            let dst = &mut out[o * inner..(o + 1) * inner];
            for i in 0..inner {
                dst[i] = scale[i] * (row[i] - mean) * inv_std + bias[i];
            }
        }
        Ok(())
    }
}

// ── RMSNorm ────────────────────────────────────────────────────

/// Root-mean-square normalization over trailing dims from `axis`:
/// `y = x · rsqrt(mean(x²) + ε) · γ`.
///
/// Inputs: `x, scale`.
pub struct RmsNorm {
    axis: i64,
    epsilon: f32,
}

impl RmsNorm {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(-1),
            epsilon: attrs.get_f32("epsilon").unwrap_or(1e-6),
        }))
    }
}

impl Operator for RmsNorm {
    fn name(&self) -> &'static str {
        "RMSNorm"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("RMSNorm", inputs, 2)?;
        expect_f32("RMSNorm", inputs[0])?;
        expect_f32("RMSNorm", inputs[1])?;
        let rank = inputs[0].shape().rank();
        let axis = resolve_axis("RMSNorm", self.axis, rank)?;
        let norm_count: i64 = inputs[0].shape().dims()[axis..].iter().product();
        if inputs[1].element_count() as i64 != norm_count {
            return Err(OpError::InvalidArgument {
                op: "RMSNorm",
                detail: format!(
                    "scale has {} elements, expected {norm_count}",
                    inputs[1].element_count()
                ),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        infer_passthrough("RMSNorm", inputs)
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("RMSNorm", outputs)?;
        expect_output_shape("RMSNorm", &outputs[0], inputs[0].shape())?;

        let dims = inputs[0].shape().dims().to_vec();
        let axis = resolve_axis("RMSNorm", self.axis, dims.len())?;
        let inner: usize = dims[axis..].iter().map(|&d| d.max(1) as usize).product();
        let outer: usize = dims[..axis].iter().map(|&d| d.max(1) as usize).product();

        let x = inputs[0].as_f32();
        let scale = inputs[1].as_f32();
        let out = outputs[0].as_f32_mut()?;

        for o in 0..outer {
            let row = &x[o * inner..(o + 1) * inner];
            let mean_sq: f32 = row.iter().map(|&v| v * v).sum::<f32>() / inner as f32;
            let inv_rms = 1.0 / (mean_sq + self.epsilon).sqrt();
            let dst = &mut out[o * inner..(o + 1) * inner];
            for i in 0..inner {
                dst[i] = row[i] * inv_rms * scale[i];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::Attribute;
    use memory_manager::DeviceKind;
    use tensor_core::{DType, Shape};

    fn output_like(t: &Tensor) -> Vec<Tensor> {
        vec![Tensor::new(t.shape().clone(), DType::F32, DeviceKind::Cpu).unwrap()]
    }

    #[test]
    fn test_batchnorm_identity_params() {
        // scale=1, bias=0, mean=0, var=1 is the identity (up to epsilon).
        let x = Tensor::from_f32(
            Shape::new(vec![1, 2, 2, 2]),
            &[1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0],
        )
        .unwrap();
        let ones = Tensor::from_f32(Shape::vector(2), &[1.0, 1.0]).unwrap();
        let zeros = Tensor::from_f32(Shape::vector(2), &[0.0, 0.0]).unwrap();

        let op = BatchNormalization::factory(&Attributes::new()).unwrap();
        let mut outputs = output_like(&x);
        op.execute(
            &[&x, &ones, &zeros, &zeros, &ones],
            &mut outputs,
            &ExecutionContext::default(),
        )
        .unwrap();
        for (y, x) in outputs[0].as_f32().iter().zip(x.as_f32()) {
            assert!((y - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_batchnorm_normalizes_channel() {
        // Channel 0: mean 2, var 4 → y = (x - 2) / 2.
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 1, 3]), &[0.0, 2.0, 4.0]).unwrap();
        let scale = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(1), &[0.0]).unwrap();
        let mean = Tensor::from_f32(Shape::vector(1), &[2.0]).unwrap();
        let var = Tensor::from_f32(Shape::vector(1), &[4.0]).unwrap();

        let op = BatchNormalization::factory(&Attributes::new()).unwrap();
        let mut outputs = output_like(&x);
        op.execute(
            &[&x, &scale, &bias, &mean, &var],
            &mut outputs,
            &ExecutionContext::default(),
        )
        .unwrap();
        let out = outputs[0].as_f32();
        assert!((out[0] + 1.0).abs() < 1e-4);
        assert!(out[1].abs() < 1e-4);
        assert!((out[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_batchnorm_fused_relu() {
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 1, 2]), &[-5.0, 5.0]).unwrap();
        let one = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        let zero = Tensor::from_f32(Shape::vector(1), &[0.0]).unwrap();

        let mut attrs = Attributes::new();
        attrs.set("fused_relu", Attribute::I64(1));
        let op = BatchNormalization::factory(&attrs).unwrap();
        let mut outputs = output_like(&x);
        op.execute(
            &[&x, &one, &zero, &zero, &one],
            &mut outputs,
            &ExecutionContext::default(),
        )
        .unwrap();
        let out = outputs[0].as_f32();
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_layernorm_zero_mean_unit_var() {
        let x = Tensor::from_f32(Shape::matrix(1, 4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let scale = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(4), &[0.0; 4]).unwrap();

        let op = LayerNormalization::factory(&Attributes::new()).unwrap();
        let mut outputs = output_like(&x);
        op.execute(
            &[&x, &scale, &bias],
            &mut outputs,
            &ExecutionContext::default(),
        )
        .unwrap();
        let out = outputs[0].as_f32();
        let mean: f32 = out.iter().sum::<f32>() / 4.0;
        let var: f32 = out.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_layernorm_scale_and_bias_applied() {
        let x = Tensor::from_f32(Shape::matrix(1, 2), &[-1.0, 1.0]).unwrap();
        let scale = Tensor::from_f32(Shape::vector(2), &[2.0, 2.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(2), &[10.0, 10.0]).unwrap();

        let op = LayerNormalization::factory(&Attributes::new()).unwrap();
        let mut outputs = output_like(&x);
        op.execute(
            &[&x, &scale, &bias],
            &mut outputs,
            &ExecutionContext::default(),
        )
        .unwrap();
        let out = outputs[0].as_f32();
        // Normalized row is [-1, 1]; scaled by 2 and shifted by 10.
        assert!((out[0] - 8.0).abs() < 1e-3);
        assert!((out[1] - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_rmsnorm_unit_scale() {
        let x = Tensor::from_f32(Shape::matrix(1, 2), &[3.0, 4.0]).unwrap();
        let scale = Tensor::from_f32(Shape::vector(2), &[1.0, 1.0]).unwrap();

        let op = RmsNorm::factory(&Attributes::new()).unwrap();
        let mut outputs = output_like(&x);
        op.execute(&[&x, &scale], &mut outputs, &ExecutionContext::default())
            .unwrap();
        let out = outputs[0].as_f32();
        // rms = sqrt((9 + 16) / 2) = sqrt(12.5)
        let rms = 12.5f32.sqrt();
        assert!((out[0] - 3.0 / rms).abs() < 1e-4);
        assert!((out[1] - 4.0 / rms).abs() < 1e-4);
    }

    #[test]
    fn test_param_length_validated() {
        let x = Tensor::from_f32(Shape::new(vec![1, 2, 1, 1]), &[1.0, 2.0]).unwrap();
        let wrong = Tensor::from_f32(Shape::vector(3), &[1.0; 3]).unwrap();
        let op = BatchNormalization::factory(&Attributes::new()).unwrap();
        assert!(op
            .validate(&[&x, &wrong, &wrong, &wrong, &wrong])
            .is_err());
    }
}
