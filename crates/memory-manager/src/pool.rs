// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Block-reusing aligned memory pool.
//!
//! The [`MemoryPool`] is the central allocator for tensor buffers. It:
//!
//! 1. Serves allocations **best-fit** from a set of retained blocks, so
//!    steady-state inference loops stop hitting the system allocator.
//! 2. Enforces a *soft* byte cap — when an allocation would exceed it the
//!    pool first releases unused blocks, then defragments, then logs and
//!    proceeds. Allocation never fails purely because of the cap.
//! 3. Releases free blocks back to the OS when the free/total ratio
//!    crosses a configurable threshold, and ages out stale blocks on
//!    [`defragment`](MemoryPool::defragment).
//! 4. Tracks allocation statistics behind a mutex.
//!
//! # Thread Safety
//! `MemoryPool` is `Send + Sync`; share it across threads via
//! `Arc<MemoryPool>`. Contention is expected on `alloc`/`free` only.

use crate::{MemoryError, PoolBuffer, PoolStats};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum alignment handed out by the pool.
pub const MIN_ALIGN: usize = 16;

/// Alignment used for buffers that SIMD kernels may touch.
pub const SIMD_ALIGN: usize = 64;

/// One block owned by the pool.
struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
    in_use: bool,
    last_used: Instant,
}

// Blocks are only reachable through the pool mutex, and the raw region is
// handed out to exactly one PoolBuffer at a time.
unsafe impl Send for Block {}

pub(crate) struct PoolInner {
    blocks: Mutex<Vec<Block>>,
    stats: Mutex<PoolStats>,
    config: Mutex<PoolConfig>,
}

struct PoolConfig {
    /// Soft byte cap; 0 means unlimited.
    max_bytes: usize,
    /// Free/total ratio past which `free` schedules a release.
    release_threshold: f64,
}

impl PoolInner {
    /// Called by `PoolBuffer::drop` to return a block.
    pub(crate) fn release_block(&self, index: usize) {
        let freed_bytes;
        let should_release = {
            let mut blocks = self.blocks.lock().expect("pool mutex poisoned");
            let block = &mut blocks[index];
            debug_assert!(block.in_use, "double free of pool block {index}");
            block.in_use = false;
            block.last_used = Instant::now();
            freed_bytes = block.layout.size();

            let total: usize = blocks.iter().map(|b| b.layout.size()).sum();
            let free: usize = blocks
                .iter()
                .filter(|b| !b.in_use)
                .map(|b| b.layout.size())
                .sum();
            let threshold = self
                .config
                .lock()
                .expect("pool mutex poisoned")
                .release_threshold;
            total > 0 && (free as f64 / total as f64) > threshold
        };

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_free(freed_bytes);
        }

        if should_release {
            self.release_unused_blocks();
        }
    }

    fn release_unused_blocks(&self) -> usize {
        let mut released = 0;
        let mut blocks = self.blocks.lock().expect("pool mutex poisoned");
        // Tombstone free blocks in place so in-use indices stay valid.
        for block in blocks.iter_mut() {
            if !block.in_use && block.layout.size() > 0 {
                released += block.layout.size();
                // SAFETY: the block was allocated with this exact layout and
                // no PoolBuffer references it (in_use is false).
                unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
                block.layout = Layout::from_size_align(0, 1).expect("zero layout");
                block.ptr = NonNull::dangling();
            }
        }
        released
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let blocks = self.blocks.get_mut().expect("pool mutex poisoned");
        for block in blocks.iter() {
            if block.layout.size() > 0 {
                // SAFETY: every live block was allocated with its stored layout.
                unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
            }
        }
    }
}

/// The primary allocator for tensor buffers.
///
/// # Example
/// ```
/// use memory_manager::MemoryPool;
///
/// let pool = MemoryPool::new();
/// let buf = pool.alloc(1024, 16).unwrap();
/// assert_eq!(buf.len(), 1024);
/// assert_eq!(pool.stats().current_allocated_bytes, buf.capacity());
///
/// // The block returns to the pool when the buffer is dropped.
/// drop(buf);
/// assert_eq!(pool.stats().current_allocated_bytes, 0);
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Creates an unbounded pool.
    pub fn new() -> Self {
        Self::with_max_bytes(0)
    }

    /// Creates a pool with a soft byte cap (`0` = unlimited).
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                blocks: Mutex::new(Vec::new()),
                stats: Mutex::new(PoolStats::default()),
                config: Mutex::new(PoolConfig {
                    // 1.0 disables threshold-driven release; free/total
                    // can never exceed it. Callers under memory pressure
                    // lower it via `set_release_threshold`.
                    max_bytes,
                    release_threshold: 1.0,
                }),
            }),
        }
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// Picks the best-fit free block whose size and alignment satisfy the
    /// request; on a miss a fresh zeroed block is allocated. The region
    /// handed out is always zeroed.
    ///
    /// # Errors
    /// [`MemoryError::ZeroSizedAllocation`] for `size == 0`,
    /// [`MemoryError::InvalidAlignment`] for non-power-of-two `align`,
    /// and [`MemoryError::OutOfMemory`] when the system allocator fails.
    pub fn alloc(&self, size: usize, align: usize) -> Result<PoolBuffer, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment { align });
        }
        let align = align.max(MIN_ALIGN);

        self.enforce_soft_cap(size);

        let mut blocks = self.inner.blocks.lock().expect("pool mutex poisoned");

        // Best-fit scan over free blocks.
        let mut best: Option<usize> = None;
        for (i, block) in blocks.iter().enumerate() {
            if block.in_use || block.layout.size() < size || block.layout.align() < align {
                continue;
            }
            match best {
                Some(b) if blocks[b].layout.size() <= block.layout.size() => {}
                _ => best = Some(i),
            }
        }

        let (index, reused) = match best {
            Some(i) => {
                let block = &mut blocks[i];
                block.in_use = true;
                block.last_used = Instant::now();
                // Hand out a zeroed region, matching the fresh-block path.
                // SAFETY: the block is at least `size` bytes and exclusively ours.
                unsafe { std::ptr::write_bytes(block.ptr.as_ptr(), 0, size) };
                (i, true)
            }
            None => {
                let layout = Layout::from_size_align(size, align)
                    .map_err(|_| MemoryError::InvalidAlignment { align })?;
                // SAFETY: layout has nonzero size (checked above).
                let raw = unsafe { alloc_zeroed(layout) };
                let ptr = NonNull::new(raw).ok_or(MemoryError::OutOfMemory {
                    requested_bytes: size,
                    align,
                })?;
                blocks.push(Block {
                    ptr,
                    layout,
                    in_use: true,
                    last_used: Instant::now(),
                });
                (blocks.len() - 1, false)
            }
        };

        let block = &blocks[index];
        let capacity = block.layout.size();
        let ptr = block.ptr;
        drop(blocks);

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_alloc(capacity, reused);
        }

        Ok(PoolBuffer::new(
            ptr,
            size,
            capacity,
            index,
            Arc::clone(&self.inner),
        ))
    }

    /// Releases every free block back to the OS. In-use blocks are
    /// untouched. Returns the number of bytes released.
    pub fn release_unused(&self) -> usize {
        let released = self.inner.release_unused_blocks();
        if released > 0 {
            tracing::debug!("pool released {released} unused bytes");
        }
        released
    }

    /// Releases free blocks that have sat unused for longer than `max_age`.
    ///
    /// Returns the number of bytes released.
    pub fn defragment(&self, max_age: Duration) -> usize {
        let mut released = 0;
        let now = Instant::now();
        let mut blocks = self.inner.blocks.lock().expect("pool mutex poisoned");
        for block in blocks.iter_mut() {
            if !block.in_use
                && block.layout.size() > 0
                && now.duration_since(block.last_used) >= max_age
            {
                released += block.layout.size();
                // SAFETY: free block, allocated with this layout.
                unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
                block.layout = Layout::from_size_align(0, 1).expect("zero layout");
                block.ptr = NonNull::dangling();
            }
        }
        released
    }

    /// Sets the soft byte cap (`0` = unlimited).
    pub fn set_max_bytes(&self, max_bytes: usize) {
        self.inner
            .config
            .lock()
            .expect("pool mutex poisoned")
            .max_bytes = max_bytes;
    }

    /// Sets the free/total ratio past which `free` triggers a release.
    ///
    /// # Errors
    /// [`MemoryError::InvalidThreshold`] when `threshold` is outside `[0, 1]`.
    pub fn set_release_threshold(&self, threshold: f64) -> Result<(), MemoryError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MemoryError::InvalidThreshold { value: threshold });
        }
        self.inner
            .config
            .lock()
            .expect("pool mutex poisoned")
            .release_threshold = threshold;
        Ok(())
    }

    /// Returns a snapshot of allocation statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Returns the number of retained blocks (in-use plus free).
    pub fn block_count(&self) -> usize {
        self.inner
            .blocks
            .lock()
            .expect("pool mutex poisoned")
            .iter()
            .filter(|b| b.layout.size() > 0)
            .count()
    }

    /// If an allocation of `incoming` bytes would cross the soft cap,
    /// try releasing, then defragmenting; if still over, log and proceed.
    fn enforce_soft_cap(&self, incoming: usize) {
        let max_bytes = self
            .inner
            .config
            .lock()
            .expect("pool mutex poisoned")
            .max_bytes;
        if max_bytes == 0 {
            return;
        }
        let current = self.stats().current_allocated_bytes;
        if current + incoming <= max_bytes {
            return;
        }
        self.release_unused();
        let current = self.stats().current_allocated_bytes;
        if current + incoming <= max_bytes {
            return;
        }
        self.defragment(Duration::ZERO);
        let current = self.stats().current_allocated_bytes;
        if current + incoming > max_bytes {
            tracing::warn!(
                "allocation of {incoming} bytes exceeds soft cap ({current} of {max_bytes} in use); proceeding"
            );
            if let Ok(mut stats) = self.inner.stats.lock() {
                stats.record_soft_cap_overrun();
            }
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("MemoryPool")
            .field("current_bytes", &stats.current_allocated_bytes)
            .field("peak_bytes", &stats.peak_allocated_bytes)
            .field("blocks", &self.block_count())
            .finish()
    }
}
