// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.
//!
//! # Ownership model
//!
//! A [`Tensor`] references an `Arc`-shared, pool-allocated byte region
//! plus a byte offset. This one representation covers all three flavours
//! the runtime needs:
//!
//! - **Owned** — the `Arc` is unique; the tensor may be mutated and the
//!   region returns to its pool on drop.
//! - **Shared owned** — the `Arc` is cloned (e.g. an initializer seen by
//!   several graph Values after constant folding); read-only.
//! - **View** — [`reshape`](Tensor::reshape) and contiguous
//!   [`slice`](Tensor::slice) clone the `Arc` with a new shape/offset and
//!   share the underlying bytes.
//!
//! Mutable access goes through `Arc::get_mut`, so writing to storage that
//! another tensor still sees is a compile-time impossibility turned into
//! an explicit [`TensorError::SharedData`] at the API boundary.
//!
//! A slice with a non-unit step, or one that breaks the contiguity of
//! row-major storage, **materialises** a fresh owned tensor instead of
//! fabricating a strided alias the rest of the system cannot handle.

use crate::{DType, Shape, TensorError, TensorLayout};
use memory_manager::{device_pool, DeviceKind, PoolBuffer, MIN_ALIGN, SIMD_ALIGN};
use std::sync::Arc;

/// Largest rank accepted by the wire form.
const MAX_WIRE_RANK: u32 = 32;

/// An n-dimensional buffer with a shape, dtype, device and layout tag.
#[derive(Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    device: DeviceKind,
    layout: TensorLayout,
    storage: Arc<PoolBuffer>,
    /// Byte offset of this tensor's first element within `storage`.
    offset: usize,
}

impl Tensor {
    // ── Construction ───────────────────────────────────────────

    /// Creates a zero-filled owning tensor, allocating from the device's
    /// pool.
    ///
    /// Floating-point tensors are aligned for SIMD; everything else gets
    /// the pool minimum.
    ///
    /// # Errors
    /// [`TensorError::InvalidArgument`] for dynamic shapes or zero-size
    /// dtypes, [`TensorError::Memory`] when the pool allocation fails.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// use memory_manager::DeviceKind;
    /// let t = Tensor::new(Shape::matrix(2, 3), DType::F32, DeviceKind::Cpu).unwrap();
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn new(shape: Shape, dtype: DType, device: DeviceKind) -> Result<Self, TensorError> {
        if shape.is_dynamic() {
            return Err(TensorError::InvalidArgument {
                op: "tensor_new",
                detail: format!("cannot allocate dynamic shape {shape}"),
            });
        }
        let size = shape.size_bytes(dtype);
        if size == 0 {
            return Err(TensorError::InvalidArgument {
                op: "tensor_new",
                detail: format!("zero-byte tensor ({shape} of {dtype})"),
            });
        }
        let align = match dtype {
            DType::F32 | DType::F16 | DType::BF16 => SIMD_ALIGN,
            _ => MIN_ALIGN,
        };
        let buf = device_pool(device).alloc(size, align)?;
        Ok(Self {
            shape,
            dtype,
            device,
            layout: TensorLayout::default(),
            storage: Arc::new(buf),
            offset: 0,
        })
    }

    /// Creates a CPU tensor from raw bytes.
    ///
    /// Returns [`TensorError::BufferSizeMismatch`] if `data` does not
    /// match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: &[u8]) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let mut tensor = Self::new(shape, dtype, DeviceKind::Cpu)?;
        tensor.bytes_mut()?.copy_from_slice(data);
        Ok(tensor)
    }

    /// Creates a CPU `F32` tensor from a slice of values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        if values.len() != shape.element_count() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.element_count() * DType::F32.size_bytes(),
                actual: values.len() * DType::F32.size_bytes(),
            });
        }
        let mut tensor = Self::new(shape, DType::F32, DeviceKind::Cpu)?;
        tensor.as_f32_mut()?.copy_from_slice(values);
        Ok(tensor)
    }

    /// Creates a CPU `I64` tensor from a slice of values.
    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self, TensorError> {
        if values.len() != shape.element_count() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.element_count() * DType::I64.size_bytes(),
                actual: values.len() * DType::I64.size_bytes(),
            });
        }
        let mut tensor = Self::new(shape, DType::I64, DeviceKind::Cpu)?;
        tensor.as_i64_mut()?.copy_from_slice(values);
        Ok(tensor)
    }

    // ── Metadata ───────────────────────────────────────────────

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the device this tensor lives on.
    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// Returns the physical layout tag.
    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Sets the physical layout tag (metadata only; no data movement).
    pub fn set_layout(&mut self, layout: TensorLayout) {
        self.layout = layout;
    }

    /// Returns the number of elements.
    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    /// Returns the byte size of this tensor's data region.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Returns `true` if other tensors share this tensor's storage.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.storage) > 1
    }

    /// Raw pointer to the first element. For aliasing checks and the
    /// host-staging copy path; never dereferenced across device borders.
    pub fn data_ptr(&self) -> *const u8 {
        self.as_bytes().as_ptr()
    }

    // ── Data access ────────────────────────────────────────────

    /// Returns the raw bytes of this tensor's region.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.as_slice()[self.offset..self.offset + self.size_bytes()]
    }

    /// Returns the raw bytes mutably.
    ///
    /// # Errors
    /// [`TensorError::SharedData`] if another tensor views this storage.
    pub fn bytes_mut(&mut self) -> Result<&mut [u8], TensorError> {
        let offset = self.offset;
        let len = self.shape.size_bytes(self.dtype);
        let buf = Arc::get_mut(&mut self.storage)
            .ok_or(TensorError::SharedData { op: "bytes_mut" })?;
        Ok(&mut buf.as_mut_slice()[offset..offset + len])
    }

    /// Interprets the region as `&[f32]`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`. Kernels validate dtypes
    /// before touching data, so this is a programming error, not a
    /// runtime condition.
    pub fn as_f32(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::F32, "as_f32 called on {} tensor", self.dtype);
        let bytes = self.as_bytes();
        // SAFETY: pool storage is at least 16-byte aligned and element
        // offsets preserve 4-byte alignment; length is elem-count exact.
        unsafe {
            std::slice::from_raw_parts(bytes.as_ptr() as *const f32, self.element_count())
        }
    }

    /// Interprets the region as `&mut [f32]`.
    ///
    /// # Errors
    /// [`TensorError::SharedData`] if the storage is aliased.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_mut(&mut self) -> Result<&mut [f32], TensorError> {
        assert_eq!(self.dtype, DType::F32, "as_f32_mut called on {} tensor", self.dtype);
        let count = self.element_count();
        let bytes = self.bytes_mut()?;
        // SAFETY: same alignment argument as `as_f32`.
        Ok(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut f32, count) })
    }

    /// Interprets the region as `&[i64]`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::I64`.
    pub fn as_i64(&self) -> &[i64] {
        assert_eq!(self.dtype, DType::I64, "as_i64 called on {} tensor", self.dtype);
        let bytes = self.as_bytes();
        // SAFETY: pool alignment ≥ 16 and element offsets keep 8-byte alignment.
        unsafe {
            std::slice::from_raw_parts(bytes.as_ptr() as *const i64, self.element_count())
        }
    }

    /// Interprets the region as `&mut [i64]`.
    ///
    /// # Errors
    /// [`TensorError::SharedData`] if the storage is aliased.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::I64`.
    pub fn as_i64_mut(&mut self) -> Result<&mut [i64], TensorError> {
        assert_eq!(self.dtype, DType::I64, "as_i64_mut called on {} tensor", self.dtype);
        let count = self.element_count();
        let bytes = self.bytes_mut()?;
        // SAFETY: same alignment argument as `as_i64`.
        Ok(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut i64, count) })
    }

    /// Returns a borrowed read-only view, the kernel-input window.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            dtype: self.dtype,
            data: self.as_bytes(),
        }
    }

    // ── Shape operations ───────────────────────────────────────

    /// Returns a view with `new_shape` sharing this tensor's bytes.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] when the element counts differ and
    /// both shapes are fully concrete.
    pub fn reshape(&self, new_shape: Shape) -> Result<Tensor, TensorError> {
        let old = self.shape.element_count();
        let new = new_shape.element_count();
        if old != new && !self.shape.is_dynamic() && !new_shape.is_dynamic() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: new_shape,
            });
        }
        Ok(Tensor {
            shape: new_shape,
            dtype: self.dtype,
            device: self.device,
            layout: self.layout,
            storage: Arc::clone(&self.storage),
            offset: self.offset,
        })
    }

    /// Slices the tensor along every dimension.
    ///
    /// `starts`, `ends`, and `steps` must each have one entry per
    /// dimension. Negative indices resolve against the dimension extent;
    /// out-of-range bounds clamp to `[0, dim]`; a step of zero is an
    /// error. A unit-step slice restricted to the leading dimension is a
    /// zero-copy view; anything else materialises an owned tensor.
    pub fn slice(
        &self,
        starts: &[i64],
        ends: &[i64],
        steps: &[i64],
    ) -> Result<Tensor, TensorError> {
        let rank = self.shape.rank();
        if starts.len() != rank || ends.len() != rank || steps.len() != rank {
            return Err(TensorError::InvalidArgument {
                op: "slice",
                detail: format!(
                    "starts/ends/steps must have rank {rank} entries, got {}/{}/{}",
                    starts.len(),
                    ends.len(),
                    steps.len()
                ),
            });
        }

        let dims = self.shape.dims();
        let mut resolved_starts = Vec::with_capacity(rank);
        let mut resolved_ends = Vec::with_capacity(rank);
        let mut out_dims = Vec::with_capacity(rank);

        for i in 0..rank {
            let dim = dims[i];
            let step = steps[i];
            if step == 0 {
                return Err(TensorError::InvalidArgument {
                    op: "slice",
                    detail: format!("step is zero for dimension {i}"),
                });
            }
            let mut start = starts[i];
            let mut end = ends[i];
            if start < 0 {
                start += dim;
            }
            if end < 0 {
                end += dim;
            }
            start = start.clamp(0, dim);
            end = end.clamp(0, dim);

            let extent = if step > 0 {
                ((end - start) + step - 1).div_euclid(step).max(0)
            } else {
                ((start - end) + (-step) - 1).div_euclid(-step).max(0)
            };
            resolved_starts.push(start);
            resolved_ends.push(end);
            out_dims.push(extent);
        }

        let has_empty_dim = out_dims.iter().any(|&d| d == 0);
        let out_shape = Shape::new(out_dims);

        // Zero-copy path: unit steps, only the leading dimension restricted.
        let unit_steps = steps.iter().all(|&s| s == 1);
        let trailing_full = (1..rank)
            .all(|i| resolved_starts[i] == 0 && resolved_ends[i] == dims[i]);
        if unit_steps && trailing_full && !has_empty_dim {
            let elem = self.dtype.size_bytes();
            let leading_stride: i64 = dims
                .get(1..)
                .unwrap_or(&[])
                .iter()
                .map(|&d| d.max(1))
                .product();
            let byte_offset = (resolved_starts.first().copied().unwrap_or(0)
                * leading_stride) as usize
                * elem;
            return Ok(Tensor {
                shape: out_shape,
                dtype: self.dtype,
                device: self.device,
                layout: self.layout,
                storage: Arc::clone(&self.storage),
                offset: self.offset + byte_offset,
            });
        }

        // Materialising path: gather strided elements into a fresh tensor.
        let mut out = Tensor::new(out_shape, self.dtype, self.device)?;
        if has_empty_dim {
            // An empty extent selects nothing; the zeroed tensor stands.
            return Ok(out);
        }
        let elem = self.dtype.size_bytes();
        let in_strides = self.shape.strides();
        let out_count = out.element_count();
        let out_dims: Vec<i64> = out.shape.dims().to_vec();
        {
            let src = self.as_bytes();
            let dst = out.bytes_mut()?;
            let mut index = vec![0i64; rank];
            for flat in 0..out_count {
                // Decompose the flat output index.
                let mut rem = flat as i64;
                for d in (0..rank).rev() {
                    let extent = out_dims[d].max(1);
                    index[d] = rem % extent;
                    rem /= extent;
                }
                // Map to the source element.
                let mut src_elem = 0i64;
                for d in 0..rank {
                    let src_idx = resolved_starts[d] + index[d] * steps[d];
                    src_elem += src_idx * in_strides[d];
                }
                let src_off = src_elem as usize * elem;
                let dst_off = flat * elem;
                dst[dst_off..dst_off + elem].copy_from_slice(&src[src_off..src_off + elem]);
            }
        }
        Ok(out)
    }

    // ── Copies and fills ───────────────────────────────────────

    /// Copies this tensor's bytes into `dst`.
    ///
    /// Shapes and dtypes must match. Same-device copies are byte copies;
    /// a direct copy between two different devices returns
    /// [`TensorError::CrossDeviceCopy`] — the engine stages those through
    /// a host tensor.
    pub fn copy_to(&self, dst: &mut Tensor) -> Result<(), TensorError> {
        if self.shape != dst.shape {
            return Err(TensorError::ShapeMismatch {
                op: "copy_to",
                lhs: self.shape.clone(),
                rhs: dst.shape.clone(),
            });
        }
        if self.dtype != dst.dtype {
            return Err(TensorError::UnsupportedDType {
                op: "copy_to",
                dtype: dst.dtype,
            });
        }
        if self.device != dst.device {
            return Err(TensorError::CrossDeviceCopy {
                from: self.device,
                to: dst.device,
            });
        }
        dst.bytes_mut()?.copy_from_slice(self.as_bytes());
        Ok(())
    }

    /// Zeroes the whole tensor.
    pub fn fill_zero(&mut self) -> Result<(), TensorError> {
        self.bytes_mut()?.fill(0);
        Ok(())
    }

    /// Broadcast-fills an `F32` tensor with a scalar.
    ///
    /// # Errors
    /// [`TensorError::UnsupportedDType`] for non-`F32` tensors,
    /// [`TensorError::SharedData`] if the storage is aliased.
    pub fn fill_f32(&mut self, value: f32) -> Result<(), TensorError> {
        if self.dtype != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "fill_f32",
                dtype: self.dtype,
            });
        }
        self.as_f32_mut()?.iter_mut().for_each(|x| *x = value);
        Ok(())
    }

    // ── Wire form ──────────────────────────────────────────────

    /// Serialises to the self-describing wire form:
    /// `u32 rank`, `rank × i64` dims, `u32` dtype tag, `u64` byte length,
    /// payload. All fields little-endian.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let dims = self.shape.dims();
        let payload = self.as_bytes();
        let mut out = Vec::with_capacity(4 + dims.len() * 8 + 4 + 8 + payload.len());
        out.extend_from_slice(&(dims.len() as u32).to_le_bytes());
        for &dim in dims {
            out.extend_from_slice(&dim.to_le_bytes());
        }
        out.extend_from_slice(&self.dtype.wire_tag().to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Deserialises the wire form produced by
    /// [`to_wire_bytes`](Tensor::to_wire_bytes), validating the rank
    /// bound, dims, dtype tag, and byte-length consistency.
    pub fn from_wire_bytes(data: &[u8]) -> Result<Tensor, TensorError> {
        let mut cursor = 0usize;
        let rank = read_u32(data, &mut cursor)?;
        if rank > MAX_WIRE_RANK {
            return Err(TensorError::MalformedWire(format!(
                "rank {rank} exceeds maximum {MAX_WIRE_RANK}"
            )));
        }
        let mut dims = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            let dim = read_i64(data, &mut cursor)?;
            if dim < 0 {
                return Err(TensorError::MalformedWire(format!(
                    "negative dimension {dim}"
                )));
            }
            dims.push(dim);
        }
        let tag = read_u32(data, &mut cursor)?;
        let dtype = DType::from_wire_tag(tag)
            .ok_or_else(|| TensorError::MalformedWire(format!("unknown dtype tag {tag}")))?;
        let byte_len = read_u64(data, &mut cursor)? as usize;

        let shape = Shape::new(dims);
        if byte_len != shape.size_bytes(dtype) {
            return Err(TensorError::MalformedWire(format!(
                "payload length {byte_len} does not match {shape} of {dtype}"
            )));
        }
        if data.len() - cursor != byte_len {
            return Err(TensorError::MalformedWire(format!(
                "expected {byte_len} payload bytes, found {}",
                data.len() - cursor
            )));
        }
        Tensor::from_bytes(shape, dtype, &data[cursor..])
    }
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, TensorError> {
    let end = *cursor + 4;
    let bytes = data
        .get(*cursor..end)
        .ok_or_else(|| TensorError::MalformedWire("truncated header".into()))?;
    *cursor = end;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
}

fn read_u64(data: &[u8], cursor: &mut usize) -> Result<u64, TensorError> {
    let end = *cursor + 8;
    let bytes = data
        .get(*cursor..end)
        .ok_or_else(|| TensorError::MalformedWire("truncated header".into()))?;
    *cursor = end;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
}

fn read_i64(data: &[u8], cursor: &mut usize) -> Result<i64, TensorError> {
    read_u64(data, cursor).map(|v| v as i64)
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &format_args!("{}", self.shape))
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .field("layout", &self.layout)
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// A borrowed, read-only window over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &Shape {
        self.shape
    }

    /// Returns the data type of the viewed tensor.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    /// Interprets the view as `&[f32]`.
    ///
    /// # Panics
    /// Panics if the dtype is not `F32`.
    pub fn as_f32(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::F32, "as_f32 called on {} view", self.dtype);
        // SAFETY: same alignment argument as Tensor::as_f32.
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const f32,
                self.shape.element_count(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zeroed() {
        let t = Tensor::new(Shape::matrix(2, 3), DType::F32, DeviceKind::Cpu).unwrap();
        assert_eq!(t.size_bytes(), 24);
        assert!(t.as_f32().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_f32_roundtrip() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Tensor::from_f32(Shape::matrix(2, 3), &data).unwrap();
        assert_eq!(t.as_f32(), &data[..]);
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::matrix(2, 3), DType::F32, &[0u8; 10]);
        assert!(matches!(result, Err(TensorError::BufferSizeMismatch { .. })));
    }

    #[test]
    fn test_dynamic_shape_rejected() {
        let mut shape = Shape::new(vec![-1, 4]);
        shape.mark_dynamic(0);
        assert!(Tensor::new(shape, DType::F32, DeviceKind::Cpu).is_err());
    }

    #[test]
    fn test_reshape_shares_data() {
        let t = Tensor::from_f32(
            Shape::new(vec![2, 3, 4]),
            &(0..24).map(|i| i as f32).collect::<Vec<_>>(),
        )
        .unwrap();
        let r = t.reshape(Shape::matrix(6, 4)).unwrap();

        assert_eq!(r.data_ptr(), t.data_ptr());
        for i in 0..24 {
            assert_eq!(r.as_f32()[i], t.as_f32()[i]);
        }
    }

    #[test]
    fn test_reshape_identity() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let r = t.reshape(t.shape().clone()).unwrap();
        assert_eq!(r.data_ptr(), t.data_ptr());
        assert_eq!(r.as_f32(), t.as_f32());
    }

    #[test]
    fn test_reshape_count_mismatch() {
        let t = Tensor::new(Shape::matrix(2, 3), DType::F32, DeviceKind::Cpu).unwrap();
        assert!(matches!(
            t.reshape(Shape::matrix(2, 4)),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_shared_storage_blocks_mutation() {
        let mut t = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let view = t.reshape(Shape::matrix(2, 2)).unwrap();
        assert!(matches!(
            t.fill_f32(2.0),
            Err(TensorError::SharedData { .. })
        ));
        drop(view);
        // Exclusive again.
        t.fill_f32(2.0).unwrap();
        assert_eq!(t.as_f32(), &[2.0; 4]);
    }

    #[test]
    fn test_slice_leading_dim_is_view() {
        let t = Tensor::from_f32(
            Shape::matrix(4, 3),
            &(0..12).map(|i| i as f32).collect::<Vec<_>>(),
        )
        .unwrap();
        let s = t.slice(&[1, 0], &[3, 3], &[1, 1]).unwrap();
        assert_eq!(s.shape().dims(), &[2, 3]);
        assert_eq!(s.as_f32(), &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        // Shares storage, offset by one row.
        assert_eq!(s.data_ptr(), unsafe { t.data_ptr().add(3 * 4) });
    }

    #[test]
    fn test_slice_negative_indices() {
        let t = Tensor::from_f32(Shape::vector(4), &[0.0, 1.0, 2.0, 3.0]).unwrap();
        // starts=[-2] on dim 4 is equivalent to starts=[2].
        let s = t.slice(&[-2], &[4], &[1]).unwrap();
        assert_eq!(s.as_f32(), &[2.0, 3.0]);
    }

    #[test]
    fn test_slice_out_of_range_clamped() {
        let t = Tensor::from_f32(Shape::vector(4), &[0.0, 1.0, 2.0, 3.0]).unwrap();
        let s = t.slice(&[0], &[100], &[1]).unwrap();
        assert_eq!(s.shape().dims(), &[4]);
    }

    #[test]
    fn test_slice_zero_step_rejected() {
        let t = Tensor::from_f32(Shape::vector(4), &[0.0; 4]).unwrap();
        assert!(matches!(
            t.slice(&[0], &[4], &[0]),
            Err(TensorError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_slice_strided_materialises() {
        let t = Tensor::from_f32(Shape::vector(6), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let s = t.slice(&[0], &[6], &[2]).unwrap();
        assert_eq!(s.as_f32(), &[0.0, 2.0, 4.0]);
        // Strided slices own fresh storage.
        assert_ne!(s.data_ptr(), t.data_ptr());
    }

    #[test]
    fn test_slice_negative_step() {
        let t = Tensor::from_f32(Shape::vector(5), &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let s = t.slice(&[4], &[-6], &[-1]).unwrap();
        // end=-6 resolves to -1, clamps to 0; walks 4,3,2,1 (end exclusive).
        assert_eq!(s.as_f32(), &[4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_slice_inner_dim_materialises() {
        let t = Tensor::from_f32(
            Shape::matrix(2, 4),
            &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        )
        .unwrap();
        let s = t.slice(&[0, 1], &[2, 3], &[1, 1]).unwrap();
        assert_eq!(s.shape().dims(), &[2, 2]);
        assert_eq!(s.as_f32(), &[1.0, 2.0, 5.0, 6.0]);
        assert_ne!(s.data_ptr(), t.data_ptr());
    }

    #[test]
    fn test_copy_to() {
        let src = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let mut dst = Tensor::new(Shape::vector(3), DType::F32, DeviceKind::Cpu).unwrap();
        src.copy_to(&mut dst).unwrap();
        assert_eq!(dst.as_f32(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_copy_to_shape_mismatch() {
        let src = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let mut dst = Tensor::new(Shape::vector(4), DType::F32, DeviceKind::Cpu).unwrap();
        assert!(matches!(
            src.copy_to(&mut dst),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fill() {
        let mut t = Tensor::new(Shape::vector(5), DType::F32, DeviceKind::Cpu).unwrap();
        t.fill_f32(3.5).unwrap();
        assert!(t.as_f32().iter().all(|&x| x == 3.5));
        t.fill_zero().unwrap();
        assert!(t.as_f32().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_wire_roundtrip() {
        let t = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, -2.0, 3.5, 0.0, 5.0, -6.25])
            .unwrap();
        let wire = t.to_wire_bytes();
        let back = Tensor::from_wire_bytes(&wire).unwrap();
        assert_eq!(back.shape(), t.shape());
        assert_eq!(back.dtype(), t.dtype());
        assert_eq!(back.as_bytes(), t.as_bytes());
    }

    #[test]
    fn test_wire_roundtrip_i64() {
        let t = Tensor::from_i64(Shape::vector(3), &[-1, 0, i64::MAX]).unwrap();
        let back = Tensor::from_wire_bytes(&t.to_wire_bytes()).unwrap();
        assert_eq!(back.as_i64(), &[-1, 0, i64::MAX]);
    }

    #[test]
    fn test_wire_rejects_truncated() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let mut wire = t.to_wire_bytes();
        wire.truncate(wire.len() - 1);
        assert!(matches!(
            Tensor::from_wire_bytes(&wire),
            Err(TensorError::MalformedWire(_))
        ));
    }

    #[test]
    fn test_wire_rejects_bad_tag() {
        let t = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        let mut wire = t.to_wire_bytes();
        // Corrupt the dtype tag (rank=1 → tag at offset 4+8).
        wire[12] = 0xEE;
        assert!(matches!(
            Tensor::from_wire_bytes(&wire),
            Err(TensorError::MalformedWire(_))
        ));
    }

    #[test]
    fn test_view() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let v = t.view();
        assert_eq!(v.shape(), t.shape());
        assert_eq!(v.as_f32(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
