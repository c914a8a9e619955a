// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory planning.

use graph_ir::ValueId;

/// Errors the planner can report.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// A planned value lost its shape between inference and planning.
    #[error("value {value:?} has no shape metadata for planning")]
    MissingShape { value: ValueId },

    /// Internal consistency failure: interlocking values were assigned
    /// the same buffer.
    #[error("values {a:?} and {b:?} interlock but share buffer {buffer}")]
    Conflict { a: ValueId, b: ValueId, buffer: usize },
}
