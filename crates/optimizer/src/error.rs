// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for optimizer passes.

/// Errors raised by passes or the pass manager.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    /// The named pass is not registered with the manager.
    #[error("pass '{0}' is not registered")]
    PassNotFound(String),

    /// A pass corrupted the graph; the manager discarded its result.
    #[error("graph invalid after pass '{pass}': {source}")]
    InvalidResult {
        pass: &'static str,
        #[source]
        source: graph_ir::GraphError,
    },

    /// A structural graph operation failed.
    #[error(transparent)]
    Graph(#[from] graph_ir::GraphError),

    /// A kernel operation failed (constant folding executes kernels).
    #[error(transparent)]
    Op(#[from] operators::OpError),

    /// A tensor operation failed while materialising constants.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
