// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and validation.

use crate::{NodeId, ValueId};

/// Errors that can occur while building, validating, or parsing a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph declares no inputs.
    #[error("graph has no inputs")]
    NoInputs,

    /// The graph declares no outputs.
    #[error("graph has no outputs")]
    NoOutputs,

    /// A node input has no producer, is not a graph input, and is not an
    /// initializer.
    #[error("value {value:?} consumed by node {node:?} has no producer and is neither a graph input nor an initializer")]
    UnproducedInput { node: NodeId, value: ValueId },

    /// Two arena entries carry the same id.
    #[error("duplicate id {id} in graph arena")]
    DuplicateId { id: usize },

    /// A node or the graph-output list references a value that does not
    /// exist in the arena.
    #[error("node {node:?} references missing value {value:?}")]
    MissingValueForInput {
        node: Option<NodeId>,
        value: ValueId,
    },

    /// The graph contains a cycle: topological sort could not cover every
    /// node.
    #[error("graph contains a cycle ({sorted} of {total} nodes sorted)")]
    Cycle { sorted: usize, total: usize },

    /// A reference to an id that is absent or removed.
    #[error("stale or unknown id: {detail}")]
    StaleId { detail: String },

    /// The textual graph form failed to parse.
    #[error("graph parse error: {0}")]
    Parse(String),
}
