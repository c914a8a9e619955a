// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused kernels produced by the operator-fusion pass.

use crate::conv::{conv2d_direct, ConvParams};
use crate::math::matmul_f32;
use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{Shape, Tensor};

// ── FusedConvBNReLU ────────────────────────────────────────────

/// Convolution with the BatchNorm affine folded in and ReLU applied.
///
/// Inputs, in fixed order: `x, weight, conv_bias, scale, shift, mean,
/// var` — always seven. The fusion pass synthesises a zero conv bias
/// when the original Conv had none, which keeps the input positions
/// unambiguous.
pub struct FusedConvBnRelu {
    params: ConvParams,
    epsilon: f32,
}

impl FusedConvBnRelu {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            params: ConvParams::from_attrs(attrs),
            epsilon: attrs.get_f32("epsilon").unwrap_or(1e-5),
        }))
    }
}

impl Operator for FusedConvBnRelu {
    fn name(&self) -> &'static str {
        "FusedConvBNReLU"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("FusedConvBNReLU", inputs, 7)?;
        for t in inputs {
            expect_f32("FusedConvBNReLU", t)?;
        }
        let x = inputs[0].shape();
        let w = inputs[1].shape();
        if x.rank() != 4 || w.rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: "FusedConvBNReLU",
                detail: format!("input and weight must be 4-D, got {x} and {w}"),
            });
        }
        let out_c = w.dims()[0];
        for (i, name) in ["conv_bias", "scale", "shift", "mean", "var"]
            .iter()
            .enumerate()
        {
            if inputs[i + 2].element_count() as i64 != out_c {
                return Err(OpError::InvalidArgument {
                    op: "FusedConvBNReLU",
                    detail: format!(
                        "{name} has {} elements, expected {out_c}",
                        inputs[i + 2].element_count()
                    ),
                });
            }
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "FusedConvBNReLU",
                detail: "requires input and weight".into(),
            });
        }
        let x = inputs[0].shape;
        let w = inputs[1].shape;
        if x.rank() != 4 || w.rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: "FusedConvBNReLU",
                detail: format!("input and weight must be 4-D, got {x} and {w}"),
            });
        }
        let (out_h, out_w) =
            self.params
                .output_hw(x.dims()[2], x.dims()[3], w.dims()[2], w.dims()[3]);
        Ok(vec![ValueInfo::new(
            Shape::new(vec![x.dims()[0], w.dims()[0], out_h, out_w]),
            inputs[0].dtype,
        )])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("FusedConvBNReLU", outputs)?;
        let infos = self.infer_shapes(&[
            InferenceInput::new(inputs[0].shape(), inputs[0].dtype()),
            InferenceInput::new(inputs[1].shape(), inputs[1].dtype()),
        ])?;
        expect_output_shape("FusedConvBNReLU", &outputs[0], &infos[0].shape)?;

        let out_c = inputs[1].shape().dims()[0] as usize;
        let conv_bias = inputs[2].as_f32();
        let scale = inputs[3].as_f32();
        let shift = inputs[4].as_f32();
        let mean = inputs[5].as_f32();
        let var = inputs[6].as_f32();

        // Rewrite the BN affine as y = a·x + b per channel, folding the
        // conv bias into b: b = shift − a·mean + a·conv_bias.
        let mut bn_a = vec![0.0f32; out_c];
        let mut bn_b = vec![0.0f32; out_c];
        for c in 0..out_c {
            let inv_std = 1.0 / (var[c] + self.epsilon).sqrt();
            bn_a[c] = scale[c] * inv_std;
            bn_b[c] = shift[c] - scale[c] * mean[c] * inv_std + bn_a[c] * conv_bias[c];
        }

        // One convolution sweep; the per-channel affine and ReLU are
        // applied by a channel-aware post step, so run the loop nest per
        // output channel via a bias of zero and fold in `post`.
        let x_shape = inputs[0].shape().clone();
        let w_shape = inputs[1].shape().clone();
        let out_shape = infos[0].shape.clone();
        let out_hw =
            (out_shape.dims()[2] * out_shape.dims()[3]) as usize;
        let batch = out_shape.dims()[0] as usize;

        conv2d_direct(
            inputs[0].as_f32(),
            inputs[1].as_f32(),
            None,
            outputs[0].as_f32_mut()?,
            &x_shape,
            &w_shape,
            &out_shape,
            self.params,
            |acc| acc,
        );

        let out = outputs[0].as_f32_mut()?;
        for n in 0..batch {
            for c in 0..out_c {
                let base = (n * out_c + c) * out_hw;
                for i in 0..out_hw {
                    let y = bn_a[c] * out[base + i] + bn_b[c];
                    out[base + i] = if y > 0.0 { y } else { 0.0 };
                }
            }
        }
        Ok(())
    }
}

// ── FusedMatMulAdd ─────────────────────────────────────────────

/// GEMM with bias: `C = A·B + bias`, bias row-broadcast.
///
/// `bias` may be `[N]`, `[1, N]`, or a full `[M, N]` matrix.
pub struct FusedMatMulAdd;

impl FusedMatMulAdd {
    pub fn factory(_attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self))
    }
}

impl Operator for FusedMatMulAdd {
    fn name(&self) -> &'static str {
        "FusedMatMulAdd"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("FusedMatMulAdd", inputs, 3)?;
        for t in inputs.iter().take(3) {
            expect_f32("FusedMatMulAdd", t)?;
        }
        let a = inputs[0].shape();
        let b = inputs[1].shape();
        if a.rank() != 2 || b.rank() != 2 || !a.is_matmul_compatible(b) {
            return Err(OpError::InvalidArgument {
                op: "FusedMatMulAdd",
                detail: format!("incompatible matrices {a} x {b}"),
            });
        }
        let (m, n) = (a.dims()[0], b.dims()[1]);
        let bias = inputs[2].element_count() as i64;
        if bias != n && bias != m * n {
            return Err(OpError::InvalidArgument {
                op: "FusedMatMulAdd",
                detail: format!("bias must have {n} or {} elements, got {bias}", m * n),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "FusedMatMulAdd",
                detail: "requires A, B, and bias".into(),
            });
        }
        let a = inputs[0].shape;
        let b = inputs[1].shape;
        if a.rank() != 2 || b.rank() != 2 {
            return Err(OpError::InvalidArgument {
                op: "FusedMatMulAdd",
                detail: format!("inputs must be 2-D, got {a} and {b}"),
            });
        }
        Ok(vec![ValueInfo::new(
            Shape::matrix(a.dims()[0], b.dims()[1]),
            inputs[0].dtype,
        )])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("FusedMatMulAdd", outputs)?;
        let m = inputs[0].shape().dims()[0] as usize;
        let k = inputs[0].shape().dims()[1] as usize;
        let n = inputs[1].shape().dims()[1] as usize;
        expect_output_shape(
            "FusedMatMulAdd",
            &outputs[0],
            &Shape::matrix(m as i64, n as i64),
        )?;

        let a = inputs[0].as_f32();
        let b = inputs[1].as_f32();
        let bias = inputs[2].as_f32();
        let c = outputs[0].as_f32_mut()?;

        matmul_f32(a, b, c, m, k, n);
        if bias.len() == n {
            for row in c.chunks_exact_mut(n) {
                for (x, &v) in row.iter_mut().zip(bias) {
                    *x += v;
                }
            }
        } else {
            for (x, &v) in c.iter_mut().zip(bias) {
                *x += v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Relu;
    use crate::conv::Conv;
    use crate::normalization::BatchNormalization;
    use memory_manager::DeviceKind;
    use tensor_core::DType;

    #[test]
    fn test_fused_matmul_add_row_broadcast() {
        let a = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(2), &[10.0, 20.0]).unwrap();
        let mut outputs =
            vec![Tensor::new(Shape::matrix(2, 2), DType::F32, DeviceKind::Cpu).unwrap()];
        FusedMatMulAdd
            .execute(&[&a, &b, &bias], &mut outputs, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outputs[0].as_f32(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_fused_matmul_add_full_bias() {
        let a = Tensor::from_f32(Shape::matrix(1, 2), &[1.0, 1.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(2, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let bias = Tensor::from_f32(Shape::matrix(1, 2), &[0.5, -0.5]).unwrap();
        let mut outputs =
            vec![Tensor::new(Shape::matrix(1, 2), DType::F32, DeviceKind::Cpu).unwrap()];
        FusedMatMulAdd
            .execute(&[&a, &b, &bias], &mut outputs, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outputs[0].as_f32(), &[4.5, 5.5]);
    }

    /// The fused kernel must match the unfused Conv → BN → ReLU chain
    /// within 1e-4.
    #[test]
    fn test_fused_conv_bn_relu_matches_unfused() {
        // Deterministic pseudo-random input.
        let mut seed = 0x2545F491u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed as f32 / u32::MAX as f32) * 2.0 - 1.0
        };

        let x_data: Vec<f32> = (0..3 * 8 * 8).map(|_| next()).collect();
        let w_data: Vec<f32> = (0..8 * 3 * 3 * 3).map(|_| next()).collect();
        let scale_data: Vec<f32> = (0..8).map(|_| next().abs() + 0.5).collect();
        let shift_data: Vec<f32> = (0..8).map(|_| next()).collect();
        let mean_data: Vec<f32> = (0..8).map(|_| next()).collect();
        let var_data: Vec<f32> = (0..8).map(|_| next().abs() + 0.5).collect();

        let x = Tensor::from_f32(Shape::new(vec![1, 3, 8, 8]), &x_data).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![8, 3, 3, 3]), &w_data).unwrap();
        let zero_bias = Tensor::from_f32(Shape::vector(8), &[0.0; 8]).unwrap();
        let scale = Tensor::from_f32(Shape::vector(8), &scale_data).unwrap();
        let shift = Tensor::from_f32(Shape::vector(8), &shift_data).unwrap();
        let mean = Tensor::from_f32(Shape::vector(8), &mean_data).unwrap();
        let var = Tensor::from_f32(Shape::vector(8), &var_data).unwrap();

        let attrs = Attributes::new();
        let ctx = ExecutionContext::default();

        // Unfused: Conv → BN → ReLU.
        let conv = Conv::factory(&attrs).unwrap();
        let conv_infos = conv
            .infer_shapes(&[
                InferenceInput::new(x.shape(), DType::F32),
                InferenceInput::new(w.shape(), DType::F32),
            ])
            .unwrap();
        let mut conv_out = vec![Tensor::new(
            conv_infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        conv.execute(&[&x, &w], &mut conv_out, &ctx).unwrap();

        let bn = BatchNormalization::factory(&attrs).unwrap();
        let mut bn_out = vec![Tensor::new(
            conv_infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        bn.execute(
            &[&conv_out[0], &scale, &shift, &mean, &var],
            &mut bn_out,
            &ctx,
        )
        .unwrap();

        let mut relu_out = vec![Tensor::new(
            conv_infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        Relu.execute(&[&bn_out[0]], &mut relu_out, &ctx).unwrap();

        // Fused.
        let fused = FusedConvBnRelu::factory(&attrs).unwrap();
        let mut fused_out = vec![Tensor::new(
            conv_infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        fused
            .execute(
                &[&x, &w, &zero_bias, &scale, &shift, &mean, &var],
                &mut fused_out,
                &ctx,
            )
            .unwrap();

        let reference = relu_out[0].as_f32();
        let actual = fused_out[0].as_f32();
        let mut max_err = 0.0f32;
        for (r, a) in reference.iter().zip(actual) {
            max_err = max_err.max((r - a).abs());
        }
        assert!(max_err <= 1e-4, "max abs error {max_err} exceeds 1e-4");
    }

    #[test]
    fn test_fused_conv_requires_seven_inputs() {
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 2, 2]), &[1.0; 4]).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[1.0]).unwrap();
        let op = FusedConvBnRelu::factory(&Attributes::new()).unwrap();
        assert!(op.validate(&[&x, &w]).is_err());
    }
}
