// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII buffer handle that returns its block to the pool on drop.
//!
//! [`PoolBuffer`] is the mechanism through which Rust's ownership model
//! enforces the pool discipline. While a buffer is live its block is
//! marked in-use and can never be released or reused; when the buffer is
//! dropped the block goes back on the free list. The borrow checker
//! prevents use-after-free at compile time.

use crate::pool::PoolInner;
use std::ptr::NonNull;
use std::sync::Arc;

/// An RAII handle to a region allocated from a [`crate::MemoryPool`].
///
/// `len` is the requested size; `capacity` is the size of the underlying
/// block, which may be larger when a best-fit block was reused.
pub struct PoolBuffer {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
    block: usize,
    pool: Arc<PoolInner>,
}

impl PoolBuffer {
    pub(crate) fn new(
        ptr: NonNull<u8>,
        len: usize,
        capacity: usize,
        block: usize,
        pool: Arc<PoolInner>,
    ) -> Self {
        Self {
            ptr,
            len,
            capacity,
            block,
            pool,
        }
    }

    /// Returns the requested length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the buffer is zero-length. Pool allocations are
    /// never zero-length, so this is always `false`; provided for slice
    /// API symmetry.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the size of the underlying block in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns an immutable view of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block stays alive and exclusively ours until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns a mutable view of the buffer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        self.pool.release_block(self.block);
    }
}

// PoolBuffer exclusively owns its region; the pool side is mutex-guarded.
unsafe impl Send for PoolBuffer {}
unsafe impl Sync for PoolBuffer {}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("block", &self.block)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::MemoryPool;

    #[test]
    fn test_len_and_capacity() {
        let pool = MemoryPool::new();
        let big = pool.alloc(1000, 16).unwrap();
        drop(big);

        let buf = pool.alloc(900, 16).unwrap();
        assert_eq!(buf.len(), 900);
        assert_eq!(buf.capacity(), 1000);
    }

    #[test]
    fn test_write_read() {
        let pool = MemoryPool::new();
        let mut buf = pool.alloc(16, 16).unwrap();
        buf.as_mut_slice()[0] = 42;
        buf.as_mut_slice()[15] = 7;
        assert_eq!(buf.as_slice()[0], 42);
        assert_eq!(buf.as_slice()[15], 7);
    }

    #[test]
    fn test_send_across_threads() {
        let pool = MemoryPool::new();
        let mut buf = pool.alloc(64, 16).unwrap();
        let handle = std::thread::spawn(move || {
            buf.as_mut_slice().fill(9);
            buf.as_slice()[63]
        });
        assert_eq!(handle.join().unwrap(), 9);
    }
}
