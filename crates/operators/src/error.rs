// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for operator validation, inference, and execution.

use tensor_core::{DType, Shape, TensorError};

/// Errors raised by kernels and the registry.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// A caller-visible contract violation: wrong arity, bad axis,
    /// out-of-range index, malformed attribute.
    #[error("invalid argument in {op}: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// The pre-allocated output does not match the shape the kernel
    /// would produce. Kernels never resize outputs.
    #[error("output shape mismatch in {op}: expected {expected}, got {actual}")]
    OutputShapeMismatch {
        op: &'static str,
        expected: Shape,
        actual: Shape,
    },

    /// The kernel does not support this element type.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// No kernel factory is registered under this op-type name.
    #[error("no kernel registered for op type '{0}'")]
    UnknownOp(String),

    /// The kernel failed mid-execution.
    #[error("kernel execution failed in {op}: {detail}")]
    Execution { op: &'static str, detail: String },

    /// An underlying tensor operation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
