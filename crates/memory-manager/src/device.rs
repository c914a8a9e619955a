// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device tags and the process-wide per-device pools.
//!
//! Every device kind owns exactly one [`MemoryPool`], created lazily and
//! shared for the lifetime of the process. The pools are initialised by
//! the session constructor via [`init_pools`]; teardown at process exit
//! releases the retained blocks through the pool's `Drop`.

use crate::MemoryPool;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Identifies the device a tensor or pool belongs to.
///
/// Only `Cpu` has kernels in this repository; the other kinds exist so the
/// provider abstraction and cross-device copy paths are exercised end to
/// end when a device provider is linked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceKind {
    /// Host CPU. Always available.
    Cpu,
    /// CUDA-class accelerator.
    Cuda,
    /// Vulkan compute device.
    Vulkan,
    /// Apple Metal device.
    Metal,
}

impl DeviceKind {
    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Vulkan => "vulkan",
            DeviceKind::Metal => "metal",
        }
    }

    /// Returns `true` for the host device.
    pub fn is_host(self) -> bool {
        self == DeviceKind::Cpu
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static POOLS: Lazy<Mutex<HashMap<DeviceKind, Arc<MemoryPool>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the process-wide pool for `device`, creating it on first use.
pub fn device_pool(device: DeviceKind) -> Arc<MemoryPool> {
    let mut pools = POOLS.lock().expect("pool registry mutex poisoned");
    Arc::clone(
        pools
            .entry(device)
            .or_insert_with(|| Arc::new(MemoryPool::new())),
    )
}

/// Forces creation of the host pool and applies a soft cap to it.
///
/// Idempotent; called by the session constructor. `max_bytes == 0` leaves
/// the pool unbounded.
pub fn init_pools(max_bytes: usize) {
    let pool = device_pool(DeviceKind::Cpu);
    pool.set_max_bytes(max_bytes);
    tracing::debug!(
        "host memory pool ready (soft cap: {})",
        if max_bytes == 0 {
            "unlimited".to_string()
        } else {
            format!("{max_bytes} bytes")
        }
    );
}
