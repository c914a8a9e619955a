// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Greedy buffer-reuse planning.
//!
//! Values are processed in birth order. Each one takes the best-fit
//! buffer whose previous user has already died, or a fresh buffer when
//! none fits. The result maps every plannable value to a buffer id; two
//! values with interlocking lifetimes never share one.

use crate::lifetime::{analyze_lifetimes, Lifetime};
use graph_ir::{Graph, NodeId, ValueId};
use std::collections::{HashMap, HashSet};

/// One value's placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BufferAssignment {
    /// Index into [`MemoryPlan::buffer_sizes`].
    pub buffer: usize,
    /// Byte offset within the buffer. Always 0 in this scheme; kept so
    /// the plan shape survives a future offset-packing planner.
    pub offset: usize,
}

/// The reuse plan for one prepared graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlan {
    assignments: HashMap<ValueId, BufferAssignment>,
    /// Size in bytes of each planned buffer.
    pub buffer_sizes: Vec<usize>,
    /// Values the planner deferred (dynamic shape or provider-bound).
    pub deferred: Vec<ValueId>,
}

impl MemoryPlan {
    /// Returns the placement for `value`, if planned.
    pub fn assignment(&self, value: ValueId) -> Option<BufferAssignment> {
        self.assignments.get(&value).copied()
    }

    /// Number of distinct buffers the plan allocates.
    pub fn buffer_count(&self) -> usize {
        self.buffer_sizes.len()
    }

    /// Total planned bytes (the sum of buffer sizes).
    pub fn total_bytes(&self) -> usize {
        self.buffer_sizes.iter().sum()
    }

    /// Returns a human-readable summary suitable for logging.
    pub fn summary(&self) -> String {
        format!(
            "MemoryPlan: {} values in {} buffers ({} bytes), {} deferred",
            self.assignments.len(),
            self.buffer_count(),
            self.total_bytes(),
            self.deferred.len(),
        )
    }

    /// Iterates over `(value, assignment)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, BufferAssignment)> + '_ {
        self.assignments.iter().map(|(&v, &a)| (v, a))
    }
}

/// Builds the reuse plan for `graph` over `order`.
///
/// `prebound` values are skipped — a provider that binds its own output
/// tensors owns their placement.
pub fn plan_memory(graph: &Graph, order: &[NodeId], prebound: &HashSet<ValueId>) -> MemoryPlan {
    let lifetimes = analyze_lifetimes(graph, order);
    plan_from_lifetimes(&lifetimes, prebound)
}

fn plan_from_lifetimes(lifetimes: &[Lifetime], prebound: &HashSet<ValueId>) -> MemoryPlan {
    let mut plan = MemoryPlan::default();

    // Free buffers: (buffer index, size, death of its last user).
    struct BufferState {
        size: usize,
        free_after: i64,
    }
    let mut buffers: Vec<BufferState> = Vec::new();

    for lifetime in lifetimes {
        if prebound.contains(&lifetime.value) {
            plan.deferred.push(lifetime.value);
            continue;
        }
        if lifetime.bytes == 0 {
            // Shape unresolved; allocation happens lazily at run time.
            plan.deferred.push(lifetime.value);
            continue;
        }

        // Best-fit among buffers whose last user died strictly before
        // this birth. A consumer at index i and a producer at index i
        // are simultaneously live, so equality does not free a buffer.
        let mut best: Option<usize> = None;
        for (i, buffer) in buffers.iter().enumerate() {
            if buffer.free_after >= lifetime.birth || buffer.size < lifetime.bytes {
                continue;
            }
            match best {
                Some(b) if buffers[b].size <= buffer.size => {}
                _ => best = Some(i),
            }
        }

        let index = match best {
            Some(i) => i,
            None => {
                buffers.push(BufferState {
                    size: lifetime.bytes,
                    free_after: i64::MIN,
                });
                buffers.len() - 1
            }
        };
        buffers[index].free_after = lifetime.death;
        plan.assignments.insert(
            lifetime.value,
            BufferAssignment {
                buffer: index,
                offset: 0,
            },
        );
    }

    plan.buffer_sizes = buffers.into_iter().map(|b| b.size).collect();
    tracing::debug!("{}", plan.summary());
    plan
}
