// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};
use memory_manager::DeviceKind;

/// Errors that can occur during tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the shape and dtype.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A caller-visible contract violation (bad axis, zero step, ...).
    #[error("invalid argument in {op}: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// Mutation was attempted on storage that other tensors still view.
    #[error("tensor data is shared; {op} requires exclusive ownership")]
    SharedData { op: &'static str },

    /// A direct copy between two non-identical devices; the engine must
    /// stage it through the host.
    #[error("cross-device copy from {from} to {to} requires host staging")]
    CrossDeviceCopy { from: DeviceKind, to: DeviceKind },

    /// The device pool failed to allocate.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// The wire form failed validation on load.
    #[error("malformed tensor wire data: {0}")]
    MalformedWire(String),
}
