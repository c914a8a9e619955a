// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise activation functions.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::Tensor;

fn validate_unary(op: &'static str, inputs: &[&Tensor]) -> Result<(), OpError> {
    expect_arity(op, inputs, 1)?;
    expect_f32(op, inputs[0])
}

fn infer_unary(
    op: &'static str,
    inputs: &[InferenceInput<'_>],
) -> Result<Vec<ValueInfo>, OpError> {
    if inputs.is_empty() {
        return Err(OpError::InvalidArgument {
            op,
            detail: "requires 1 input".into(),
        });
    }
    Ok(vec![ValueInfo::new(inputs[0].shape.clone(), inputs[0].dtype)])
}

fn execute_unary(
    op: &'static str,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    f: impl Fn(f32) -> f32,
) -> Result<(), OpError> {
    validate_unary(op, inputs)?;
    expect_single_output(op, outputs)?;
    expect_output_shape(op, &outputs[0], inputs[0].shape())?;

    let src = inputs[0].as_f32();
    let dst = outputs[0].as_f32_mut()?;
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f(s);
    }
    Ok(())
}

macro_rules! unary_op {
    ($struct_name:ident, $op_name:literal, $f:expr) => {
        pub struct $struct_name;

        impl $struct_name {
            pub fn factory(_attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
                Ok(Box::new(Self))
            }
        }

        impl Operator for $struct_name {
            fn name(&self) -> &'static str {
                $op_name
            }

            fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
                validate_unary($op_name, inputs)
            }

            fn infer_shapes(
                &self,
                inputs: &[InferenceInput<'_>],
            ) -> Result<Vec<ValueInfo>, OpError> {
                infer_unary($op_name, inputs)
            }

            fn execute(
                &self,
                inputs: &[&Tensor],
                outputs: &mut [Tensor],
                _ctx: &ExecutionContext,
            ) -> Result<(), OpError> {
                execute_unary($op_name, inputs, outputs, $f)
            }
        }
    };
}

unary_op!(Relu, "Relu", |x: f32| x.max(0.0));
unary_op!(Sigmoid, "Sigmoid", |x: f32| 1.0 / (1.0 + (-x).exp()));
unary_op!(Tanh, "Tanh", f32::tanh);
unary_op!(Gelu, "Gelu", gelu_tanh);
unary_op!(Silu, "Silu", |x: f32| x / (1.0 + (-x).exp()));

/// Tanh-approximation GELU:
/// `0.5 · x · (1 + tanh(√(2/π) · (x + 0.044715 · x³)))`.
fn gelu_tanh(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    const COEFF: f32 = 0.044_715;
    let inner = SQRT_2_OVER_PI * (x + COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}
