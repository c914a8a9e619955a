// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the memory manager.

/// Errors that can occur during pool operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The underlying allocator returned null.
    #[error("out of memory: failed to allocate {requested_bytes} bytes (align {align})")]
    OutOfMemory {
        requested_bytes: usize,
        align: usize,
    },

    /// A zero-sized allocation was requested.
    #[error("zero-sized allocation requested")]
    ZeroSizedAllocation,

    /// The requested alignment is not a power of two.
    #[error("invalid alignment {align}: must be a power of two")]
    InvalidAlignment { align: usize },

    /// A release threshold outside `[0, 1]` was supplied.
    #[error("invalid release threshold {value}: must be within [0, 1]")]
    InvalidThreshold { value: f64 },
}
