// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Numerically stable softmax.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, resolve_axis,
    ExecutionContext, InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::Tensor;

/// Softmax along `axis` (default −1): subtract the row maximum,
/// exponentiate, normalise.
pub struct Softmax {
    axis: i64,
}

impl Softmax {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(-1),
        }))
    }
}

impl Operator for Softmax {
    fn name(&self) -> &'static str {
        "Softmax"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Softmax", inputs, 1)?;
        expect_f32("Softmax", inputs[0])?;
        if inputs[0].shape().rank() > 0 {
            resolve_axis("Softmax", self.axis, inputs[0].shape().rank())?;
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Softmax",
                detail: "requires 1 input".into(),
            });
        }
        Ok(vec![ValueInfo::new(inputs[0].shape.clone(), inputs[0].dtype)])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Softmax", outputs)?;
        expect_output_shape("Softmax", &outputs[0], inputs[0].shape())?;

        let dims = inputs[0].shape().dims().to_vec();
        let src = inputs[0].as_f32();
        let dst = outputs[0].as_f32_mut()?;

        if dims.is_empty() {
            // Softmax of a scalar is 1.
            dst[0] = 1.0;
            return Ok(());
        }

        let axis = resolve_axis("Softmax", self.axis, dims.len())?;
        let axis_len = dims[axis].max(0) as usize;
        if axis_len == 0 {
            return Ok(());
        }
        let inner: usize = dims[axis + 1..].iter().map(|&d| d.max(1) as usize).product();
        let outer: usize = dims[..axis].iter().map(|&d| d.max(1) as usize).product();

        for o in 0..outer {
            for i in 0..inner {
                let base = o * axis_len * inner + i;
                let at = |k: usize| base + k * inner;

                let mut max_val = f32::NEG_INFINITY;
                for k in 0..axis_len {
                    max_val = max_val.max(src[at(k)]);
                }

                let mut sum = 0.0f32;
                for k in 0..axis_len {
                    let e = (src[at(k)] - max_val).exp();
                    dst[at(k)] = e;
                    sum += e;
                }

                if sum > 0.0 {
                    let inv = 1.0 / sum;
                    for k in 0..axis_len {
                        dst[at(k)] *= inv;
                    }
                }
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

    fn run(input: &Tensor, axis: Option<i64>) -> Vec<f32> {
        let mut attrs = Attributes::new();
        if let Some(a) = axis {
            attrs.set("axis", Attribute::I64(a));
        }
        let op = Softmax::factory(&attrs).unwrap();
        let mut outputs =
            vec![Tensor::new(input.shape().clone(), DType::F32, DeviceKind::Cpu).unwrap()];
        op.execute(&[input], &mut outputs, &ExecutionContext::default())
            .unwrap();
        outputs[0].as_f32().to_vec()
    }

    #[test]
    fn test_uniform() {
        let x = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let out = run(&x, None);
        for v in out {
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rows_sum_to_one() {
        let x = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, -1.0, 0.0, 1.0]).unwrap();
        let out = run(&x, None);
        let row0: f32 = out[0..3].iter().sum();
        let row1: f32 = out[3..6].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-6);
        assert!((row1 - 1.0).abs() < 1e-6);
        // Monotonic within a row.
        assert!(out[0] < out[1] && out[1] < out[2]);
    }

    #[test]
    fn test_large_element_is_one_hot() {
        let x = Tensor::from_f32(Shape::vector(4), &[0.0, 1000.0, 0.0, 0.0]).unwrap();
        let out = run(&x, None);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!(out[0] < 1e-6 && out[2] < 1e-6 && out[3] < 1e-6);
    }

    #[test]
    fn test_numerical_stability() {
        let x = Tensor::from_f32(Shape::vector(3), &[1000.0, 1001.0, 1002.0]).unwrap();
        let out = run(&x, None);
        assert!(out.iter().all(|v| v.is_finite()));
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_axis_zero() {
        // Softmax over columns of a [2, 2] matrix.
        let x = Tensor::from_f32(Shape::matrix(2, 2), &[0.0, 0.0, 0.0, 0.0]).unwrap();
        let out = run(&x, Some(0));
        for v in out {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scalar_is_one() {
        let x = Tensor::from_f32(Shape::scalar(), &[3.7]).unwrap();
        assert_eq!(run(&x, None), vec![1.0]);
    }
}
