// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for profiling and diagnostics.
//!
//! [`PoolStats`] tracks cumulative metrics about how a memory pool is
//! being used: live and peak bytes, block reuse, and soft-cap overruns.
//! These stats are the primary tool for sizing `memory_pool_size`.

/// Cumulative statistics about memory pool usage.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    /// Bytes currently handed out (in-use blocks).
    pub current_allocated_bytes: usize,
    /// High-water mark of `current_allocated_bytes`.
    pub peak_allocated_bytes: usize,
    /// Total number of allocation requests served.
    pub allocation_count: u64,
    /// Total number of blocks returned to the pool.
    pub free_count: u64,
    /// Allocations served by reusing an existing free block.
    pub reuse_count: u64,
    /// Times an allocation proceeded past the soft byte cap.
    pub soft_cap_overruns: u64,
}

impl PoolStats {
    /// Returns the block reuse ratio as a fraction in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` if no allocations have been made.
    pub fn reuse_ratio(&self) -> f64 {
        if self.allocation_count == 0 {
            return 0.0;
        }
        self.reuse_count as f64 / self.allocation_count as f64
    }

    pub(crate) fn record_alloc(&mut self, bytes: usize, reused: bool) {
        self.allocation_count += 1;
        if reused {
            self.reuse_count += 1;
        }
        self.current_allocated_bytes += bytes;
        if self.current_allocated_bytes > self.peak_allocated_bytes {
            self.peak_allocated_bytes = self.current_allocated_bytes;
        }
    }

    pub(crate) fn record_free(&mut self, bytes: usize) {
        self.free_count += 1;
        self.current_allocated_bytes = self.current_allocated_bytes.saturating_sub(bytes);
    }

    pub(crate) fn record_soft_cap_overrun(&mut self) {
        self.soft_cap_overruns += 1;
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_allocated_bytes as f64 / (1024.0 * 1024.0);
        let current_mb = self.current_allocated_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Pool: {:.2} MB live, peak {:.2} MB, {} allocs ({:.0}% reused), {} frees, {} cap overruns",
            current_mb,
            peak_mb,
            self.allocation_count,
            self.reuse_ratio() * 100.0,
            self.free_count,
            self.soft_cap_overruns,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let s = PoolStats::default();
        assert_eq!(s.allocation_count, 0);
        assert_eq!(s.reuse_ratio(), 0.0);
    }

    #[test]
    fn test_peak_tracking() {
        let mut s = PoolStats::default();
        s.record_alloc(100, false);
        s.record_alloc(200, false);
        assert_eq!(s.peak_allocated_bytes, 300);
        s.record_free(200);
        assert_eq!(s.current_allocated_bytes, 100);
        // Peak does not decrease.
        assert_eq!(s.peak_allocated_bytes, 300);
    }

    #[test]
    fn test_reuse_ratio() {
        let mut s = PoolStats::default();
        s.record_alloc(64, false);
        s.record_alloc(64, true);
        s.record_alloc(64, true);
        assert!((s.reuse_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let mut s = PoolStats::default();
        s.record_alloc(1024 * 1024, false);
        let text = s.summary();
        assert!(text.contains("1 allocs"));
        assert!(text.contains("peak 1.00 MB"));
    }
}
