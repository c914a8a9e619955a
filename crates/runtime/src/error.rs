// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the runtime.
//!
//! Every fallible operation returns a `Result`; errors propagate upward
//! and nothing is silently swallowed. The variants map one-to-one onto
//! the runtime's error taxonomy: caller mistakes (`InvalidArgument`),
//! missing kernels or providers (`NotFound`), load-time graph problems
//! (`InvalidModel`), device failures (`Device`), and kernel failures at
//! execution time (`Execution`).

use operators::OpError;

/// Errors surfaced by sessions, engines, providers, and schedulers.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Caller-visible contract violation: wrong input arity, bad name,
    /// mismatched shapes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A kernel, provider, value, or pass could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An optional capability is not built into this binary.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The loaded graph failed validation.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A device operation failed.
    #[error("device error: {0}")]
    Device(String),

    /// A kernel failed while executing a node.
    #[error("execution failed at node '{node}': {source}")]
    Execution {
        node: String,
        #[source]
        source: OpError,
    },

    /// Configuration parsing or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operator-layer failure outside node execution (kernel
    /// construction, shape inference during preparation).
    #[error(transparent)]
    Op(#[from] OpError),

    /// A tensor operation failed.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),

    /// The memory pool failed.
    #[error(transparent)]
    Memory(#[from] memory_manager::MemoryError),

    /// A structural graph operation failed.
    #[error(transparent)]
    Graph(#[from] graph_ir::GraphError),

    /// The optimizer aborted.
    #[error(transparent)]
    Optimizer(#[from] optimizer::OptimizerError),

    /// File I/O failed while loading a model or config.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
