// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-node profiling records.
//!
//! Timings are taken with the monotonic clock around each kernel call
//! and include any internal parallelism of the kernel. The memory
//! figure is a rough footprint: the sum of the node's output tensor
//! sizes.

use std::time::Duration;

/// One node's timing and memory record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeProfile {
    /// Node display name.
    pub name: String,
    /// Operator type.
    pub op_type: String,
    /// Wall time around the kernel call.
    pub time_ms: f64,
    /// Sum of output tensor byte sizes.
    pub bytes: usize,
}

/// Aggregate record for one profiled run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProfilingResult {
    /// Total wall time of the run.
    pub total_ms: f64,
    /// Largest single-node output footprint seen.
    pub peak_bytes: usize,
    /// Per-node records in completion order.
    pub node_profiles: Vec<NodeProfile>,
}

impl ProfilingResult {
    pub(crate) fn from_parts(total: Duration, node_profiles: Vec<NodeProfile>) -> Self {
        let peak_bytes = node_profiles.iter().map(|p| p.bytes).max().unwrap_or(0);
        Self {
            total_ms: total.as_secs_f64() * 1000.0,
            peak_bytes,
            node_profiles,
        }
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let kernel_ms: f64 = self.node_profiles.iter().map(|p| p.time_ms).sum();
        format!(
            "Profile: {:.3} ms total ({:.3} ms in kernels), {} nodes, peak output {:.2} KB",
            self.total_ms,
            kernel_ms,
            self.node_profiles.len(),
            self.peak_bytes as f64 / 1024.0,
        )
    }

    /// The slowest nodes, most expensive first, at most `limit`.
    pub fn hottest(&self, limit: usize) -> Vec<&NodeProfile> {
        let mut sorted: Vec<&NodeProfile> = self.node_profiles.iter().collect();
        sorted.sort_by(|a, b| b.time_ms.total_cmp(&a.time_ms));
        sorted.truncate(limit);
        sorted
    }
}
