// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise arithmetic and matrix multiplication.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{DType, Shape, Tensor};

/// Division policy: divisors with magnitude below this yield 0 rather
/// than IEEE infinities. Exporters that rely on IEEE semantics would
/// need a configuration switch.
const DIV_EPSILON: f32 = 1e-8;

// ── Binary elementwise ─────────────────────────────────────────

fn validate_binary(op: &'static str, inputs: &[&Tensor]) -> Result<(), OpError> {
    expect_arity(op, inputs, 2)?;
    expect_f32(op, inputs[0])?;
    expect_f32(op, inputs[1])?;
    if inputs[0].shape() != inputs[1].shape() {
        return Err(OpError::InvalidArgument {
            op,
            detail: format!(
                "shapes must match, got {} vs {}",
                inputs[0].shape(),
                inputs[1].shape()
            ),
        });
    }
    Ok(())
}

fn infer_binary(
    op: &'static str,
    inputs: &[InferenceInput<'_>],
) -> Result<Vec<ValueInfo>, OpError> {
    if inputs.len() < 2 {
        return Err(OpError::InvalidArgument {
            op,
            detail: format!("requires 2 inputs, got {}", inputs.len()),
        });
    }
    Ok(vec![ValueInfo::new(inputs[0].shape.clone(), inputs[0].dtype)])
}

fn execute_binary(
    op: &'static str,
    inputs: &[&Tensor],
    outputs: &mut [Tensor],
    f: impl Fn(f32, f32) -> f32,
) -> Result<(), OpError> {
    validate_binary(op, inputs)?;
    expect_single_output(op, outputs)?;
    expect_output_shape(op, &outputs[0], inputs[0].shape())?;

    let lhs = inputs[0].as_f32();
    let rhs = inputs[1].as_f32();
    let out = outputs[0].as_f32_mut()?;
    for ((o, &a), &b) in out.iter_mut().zip(lhs).zip(rhs) {
        *o = f(a, b);
    }
    Ok(())
}

macro_rules! binary_op {
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
                validate_binary($op_name, inputs)
            }

            fn infer_shapes(
                &self,
                inputs: &[InferenceInput<'_>],
            ) -> Result<Vec<ValueInfo>, OpError> {
                infer_binary($op_name, inputs)
            }

            fn execute(
                &self,
                inputs: &[&Tensor],
                outputs: &mut [Tensor],
                _ctx: &ExecutionContext,
            ) -> Result<(), OpError> {
                execute_binary($op_name, inputs, outputs, $f)
            }
        }
    };
}

binary_op!(Add, "Add", |a, b| a + b);
binary_op!(Sub, "Sub", |a, b| a - b);
binary_op!(Mul, "Mul", |a, b| a * b);
binary_op!(Div, "Div", |a: f32, b: f32| if b.abs() < DIV_EPSILON {
    0.0
} else {
    a / b
});

// ── MatMul ─────────────────────────────────────────────────────

/// 2-D row-major matrix multiply: `C[M,N] = A[M,K] · B[K,N]`.
pub struct MatMul;

impl MatMul {
    pub fn factory(_attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self))
    }
}

impl Operator for MatMul {
    fn name(&self) -> &'static str {
        "MatMul"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("MatMul", inputs, 2)?;
        expect_f32("MatMul", inputs[0])?;
        expect_f32("MatMul", inputs[1])?;
        let lhs = inputs[0].shape();
        let rhs = inputs[1].shape();
        if lhs.rank() != 2 || rhs.rank() != 2 {
            return Err(OpError::InvalidArgument {
                op: "MatMul",
                detail: format!("inputs must be 2-D, got {lhs} and {rhs}"),
            });
        }
        if !lhs.is_matmul_compatible(rhs) {
            return Err(OpError::InvalidArgument {
                op: "MatMul",
                detail: format!("inner dimensions disagree: {lhs} x {rhs}"),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "MatMul",
                detail: "requires 2 inputs".into(),
            });
        }
        let lhs = inputs[0].shape;
        let rhs = inputs[1].shape;
        if lhs.rank() != 2 || rhs.rank() != 2 {
            return Err(OpError::InvalidArgument {
                op: "MatMul",
                detail: format!("inputs must be 2-D, got {lhs} and {rhs}"),
            });
        }
        let dims = vec![lhs.dims()[0], rhs.dims()[1]];
        let dynamic = vec![lhs.is_dim_dynamic(0), rhs.is_dim_dynamic(1)];
        Ok(vec![ValueInfo::new(
            Shape::with_dynamic(dims, dynamic),
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
        expect_single_output("MatMul", outputs)?;

        let m = inputs[0].shape().dims()[0] as usize;
        let k = inputs[0].shape().dims()[1] as usize;
        let n = inputs[1].shape().dims()[1] as usize;
        let expected = Shape::matrix(m as i64, n as i64);
        expect_output_shape("MatMul", &outputs[0], &expected)?;

        let a = inputs[0].as_f32();
        let b = inputs[1].as_f32();
        let c = outputs[0].as_f32_mut()?;
        matmul_f32(a, b, c, m, k, n);
        Ok(())
    }
}

/// Portable f32 matrix multiply in ikj order.
///
/// The inner loop is a saxpy over a row of C, sequential in memory for
/// both C and B.
pub(crate) fn matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i in 0..m {
        for p in 0..k {
            let a_ip = a[i * k + p];
            let c_row = &mut c[i * n..(i + 1) * n];
            let b_row = &b[p * n..(p + 1) * n];
            for j in 0..n {
                c_row[j] += a_ip * b_row[j];
            }
        }
    }
}
