// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The operator contract.
//!
//! A kernel is stateless apart from the attributes its factory parsed at
//! construction. It validates inputs, infers output shapes from input
//! metadata, and executes by reading input tensor borrows and writing to
//! pre-allocated output tensors. Kernels never resize outputs; a planned
//! shape that disagrees with the runtime shape is an error surfaced to
//! the engine.

use crate::OpError;
use graph_ir::Attributes;
use memory_manager::DeviceKind;
use tensor_core::{DType, Shape, Tensor};

/// Shape/dtype metadata for one value, the currency of shape inference.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub shape: Shape,
    pub dtype: DType,
}

impl ValueInfo {
    pub fn new(shape: Shape, dtype: DType) -> Self {
        Self { shape, dtype }
    }
}

/// One input as seen by a shape-inference rule.
///
/// Rules are pure functions of shapes, dtypes, and attributes — except
/// that Reshape's shape tensor and Slice's index tensors may be read
/// from `tensor` when the value is a bound initializer. When such data
/// is needed but absent, the rule marks the affected dims dynamic.
#[derive(Debug, Clone, Copy)]
pub struct InferenceInput<'a> {
    pub shape: &'a Shape,
    pub dtype: DType,
    pub tensor: Option<&'a Tensor>,
}

impl<'a> InferenceInput<'a> {
    pub fn new(shape: &'a Shape, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            tensor: None,
        }
    }

    pub fn with_tensor(shape: &'a Shape, dtype: DType, tensor: &'a Tensor) -> Self {
        Self {
            shape,
            dtype,
            tensor: Some(tensor),
        }
    }
}

/// Ambient execution state handed to every kernel invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The device the current node was assigned to.
    pub device: DeviceKind,
    /// Worker threads a kernel may use internally; kernels must not
    /// exceed this. `1` means serial.
    pub num_threads: usize,
}

impl ExecutionContext {
    pub fn new(device: DeviceKind) -> Self {
        Self {
            device,
            num_threads: 1,
        }
    }

    pub fn with_threads(device: DeviceKind, num_threads: usize) -> Self {
        Self {
            device,
            num_threads: num_threads.max(1),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(DeviceKind::Cpu)
    }
}

/// The kernel contract every operator implements.
pub trait Operator: Send + Sync {
    /// The registered op-type name.
    fn name(&self) -> &'static str;

    /// Checks input arity, dtypes, and shape preconditions.
    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError>;

    /// Computes output shapes and dtypes from input metadata.
    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError>;

    /// Runs the kernel. Inputs are borrows; outputs were pre-allocated
    /// by the engine or planner and must not be resized.
    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        ctx: &ExecutionContext,
    ) -> Result<(), OpError>;
}

/// Creates a kernel from a node's attributes.
pub type OperatorFactory = fn(&Attributes) -> Result<Box<dyn Operator>, OpError>;

// ── Shared precondition helpers ────────────────────────────────

pub(crate) fn expect_arity(
    op: &'static str,
    inputs: &[&Tensor],
    min: usize,
) -> Result<(), OpError> {
    if inputs.len() < min {
        return Err(OpError::InvalidArgument {
            op,
            detail: format!("requires at least {min} inputs, got {}", inputs.len()),
        });
    }
    Ok(())
}

pub(crate) fn expect_f32(op: &'static str, tensor: &Tensor) -> Result<(), OpError> {
    if tensor.dtype() != DType::F32 {
        return Err(OpError::UnsupportedDType {
            op,
            dtype: tensor.dtype(),
        });
    }
    Ok(())
}

pub(crate) fn expect_single_output(
    op: &'static str,
    outputs: &[Tensor],
) -> Result<(), OpError> {
    if outputs.len() != 1 {
        return Err(OpError::InvalidArgument {
            op,
            detail: format!("expected exactly 1 output, got {}", outputs.len()),
        });
    }
    Ok(())
}

/// The planned output must already have the shape the kernel produces.
pub(crate) fn expect_output_shape(
    op: &'static str,
    output: &Tensor,
    expected: &Shape,
) -> Result<(), OpError> {
    if output.shape() != expected {
        return Err(OpError::OutputShapeMismatch {
            op,
            expected: expected.clone(),
            actual: output.shape().clone(),
        });
    }
    Ok(())
}

/// Resolves a possibly negative axis against `rank`.
pub(crate) fn resolve_axis(op: &'static str, axis: i64, rank: usize) -> Result<usize, OpError> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved >= rank as i64 {
        return Err(OpError::InvalidArgument {
            op,
            detail: format!("axis {axis} out of range for rank {rank}"),
        });
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis("t", -1, 3).unwrap(), 2);
        assert_eq!(resolve_axis("t", 0, 3).unwrap(), 0);
        assert_eq!(resolve_axis("t", 2, 3).unwrap(), 2);
        assert!(resolve_axis("t", 3, 3).is_err());
        assert!(resolve_axis("t", -4, 3).is_err());
    }

    #[test]
    fn test_context_threads_floor() {
        let ctx = ExecutionContext::with_threads(DeviceKind::Cpu, 0);
        assert_eq!(ctx.num_threads, 1);
    }
}
