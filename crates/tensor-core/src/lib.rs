// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor, shape, and dtype primitives for the inference runtime.
//!
//! This crate provides:
//! - [`Tensor`] — an n-dimensional buffer with owned, shared, and view
//!   flavours backed by the per-device memory pools.
//! - [`TensorView`] — a borrowed read-only window for kernel inputs.
//! - [`Shape`] — dimension descriptors with optional dynamic dims.
//! - [`DType`] — supported element types and the interchange tag mapping.
//! - [`TensorLayout`] — NCHW/NHWC-family physical layout tags.
//!
//! # Design Goals
//! - Zero-copy reshape and contiguous-slice views; strided slices
//!   materialise instead of faking alias strides.
//! - Allocation through [`memory_manager`] pools, never bare `Vec`s, so
//!   the soft cap and reuse statistics see every tensor.
//! - Clean error types via `thiserror`; no panics on fallible paths.

mod dtype;
mod error;
mod layout;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use layout::TensorLayout;
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
