// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Aligned, reusing memory pools for tensor buffers.
//!
//! This crate provides:
//! - [`MemoryPool`] — a best-fit block pool with a soft byte cap,
//!   threshold-driven release, and age-based defragmentation.
//! - [`PoolBuffer`] — the RAII handle that returns its block on drop.
//! - [`PoolStats`] — allocation statistics for profiling.
//! - [`DeviceKind`] and [`device_pool`] — one process-wide pool per device.
//!
//! # Design Goals
//! - Allocation alignment of at least 16 bytes (64 for SIMD-touched data).
//! - The soft cap degrades gracefully: release, defragment, then log and
//!   proceed — an inference run is never aborted by the cap alone.
//! - All operations thread-safe; `stats()` contends only on its own mutex.

mod buffer;
mod device;
mod error;
mod pool;
mod stats;

pub use buffer::PoolBuffer;
pub use device::{device_pool, init_pools, DeviceKind};
pub use error::MemoryError;
pub use pool::{MemoryPool, MIN_ALIGN, SIMD_ALIGN};
pub use stats::PoolStats;
