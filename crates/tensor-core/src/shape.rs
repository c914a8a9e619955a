// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors with optional dynamic dimensions.

use std::fmt;

/// Describes the dimensionality of a [`crate::Tensor`].
///
/// Each dimension is a non-negative extent paired with a *dynamic* flag.
/// A dynamic dimension is one the model left unresolved at load time
/// (e.g. batch size); it compares equal to any concrete extent and to
/// other dynamic dimensions.
#[derive(Debug, Clone, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<i64>,
    dynamic: Vec<bool>,
}

impl Shape {
    /// Creates a fully static shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.element_count(), 24);
    /// ```
    pub fn new(dims: Vec<i64>) -> Self {
        let dynamic = vec![false; dims.len()];
        Self { dims, dynamic }
    }

    /// Creates a shape with per-dimension dynamic flags.
    ///
    /// `dynamic` must be the same length as `dims`; extra entries are
    /// truncated and missing ones default to static.
    pub fn with_dynamic(dims: Vec<i64>, mut dynamic: Vec<bool>) -> Self {
        dynamic.resize(dims.len(), false);
        Self { dims, dynamic }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self::new(vec![])
    }

    /// Creates a 1-D shape.
    pub fn vector(len: i64) -> Self {
        Self::new(vec![len])
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: i64, cols: i64) -> Self {
        Self::new(vec![rows, cols])
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// Only positive dimensions contribute; dynamic or zero extents are
    /// skipped, so the count is a lower bound until all dims resolve.
    /// A scalar shape (rank 0) has one element.
    pub fn element_count(&self) -> usize {
        let mut count: i64 = 1;
        for &dim in &self.dims {
            if dim > 0 {
                count *= dim;
            }
        }
        count as usize
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Returns the extent of one dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<i64> {
        self.dims.get(index).copied()
    }

    /// Returns `true` if the dimension at `index` is dynamic.
    pub fn is_dim_dynamic(&self, index: usize) -> bool {
        self.dynamic.get(index).copied().unwrap_or(false)
    }

    /// Returns `true` if any dimension is dynamic.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic.iter().any(|&d| d)
    }

    /// Marks the dimension at `index` as dynamic.
    pub fn mark_dynamic(&mut self, index: usize) {
        if let Some(flag) = self.dynamic.get_mut(index) {
            *flag = true;
        }
    }

    /// Returns the dims with dynamic entries replaced by `-1`.
    pub fn display_dims(&self) -> Vec<i64> {
        self.dims
            .iter()
            .zip(&self.dynamic)
            .map(|(&d, &dy)| if dy { -1 } else { d })
            .collect()
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.element_count() * dtype.size_bytes()
    }

    /// Computes row-major (C-order) strides in elements.
    ///
    /// The stride for dimension `i` is the number of elements to skip in
    /// the flat buffer to advance one step along that dimension.
    pub fn strides(&self) -> Vec<i64> {
        let rank = self.dims.len();
        if rank == 0 {
            return vec![];
        }
        let mut strides = vec![0i64; rank];
        strides[rank - 1] = 1;
        for i in (0..rank - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1].max(1);
        }
        strides
    }

    /// Returns `true` if the shapes are compatible for a matrix multiply:
    /// `self` is `[..., M, K]` and `other` is `[..., K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        if self.rank() < 2 || other.rank() < 2 {
            return false;
        }
        let k_lhs = self.dims[self.rank() - 1];
        let k_rhs = other.dims[other.rank() - 2];
        k_lhs == k_rhs
    }
}

/// Dim-wise equality where a dynamic dim matches anything.
impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        if self.dims.len() != other.dims.len() {
            return false;
        }
        self.dims
            .iter()
            .zip(&self.dynamic)
            .zip(other.dims.iter().zip(&other.dynamic))
            .all(|((&a, &a_dyn), (&b, &b_dyn))| a_dyn || b_dyn || a == b)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.display_dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *d < 0 {
                write!(f, "?")?;
            } else {
                write!(f, "{d}")?;
            }
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Self::new(dims)
    }
}

/// Convenience: `Shape::from(&[2, 3][..])`.
impl From<&[i64]> for Shape {
    fn from(dims: &[i64]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.element_count(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.element_count(), 12);
        assert_eq!(s.strides(), vec![4, 1]);
        assert_eq!(s.size_bytes(DType::F32), 48);
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_dynamic_equality() {
        let mut a = Shape::new(vec![1, 128]);
        a.mark_dynamic(0);
        let b = Shape::new(vec![32, 128]);
        // Dynamic dim matches any concrete extent.
        assert_eq!(a, b);

        let mut c = Shape::new(vec![16, 128]);
        c.mark_dynamic(0);
        assert_eq!(a, c);

        // Rank mismatch is never equal.
        let d = Shape::new(vec![128]);
        assert_ne!(a, d);

        // Static dims still compare exactly.
        let e = Shape::new(vec![32, 64]);
        assert_ne!(a, e);
    }

    #[test]
    fn test_element_count_skips_dynamic() {
        let mut s = Shape::new(vec![-1, 4, 8]);
        s.mark_dynamic(0);
        assert_eq!(s.element_count(), 32);
    }

    #[test]
    fn test_matmul_compatible() {
        let a = Shape::matrix(3, 4);
        let b = Shape::matrix(4, 5);
        assert!(a.is_matmul_compatible(&b));

        let c = Shape::matrix(5, 5);
        assert!(!a.is_matmul_compatible(&c));
    }

    #[test]
    fn test_display() {
        let mut s = Shape::new(vec![2, 3, 4]);
        assert_eq!(format!("{s}"), "[2, 3, 4]");
        s.mark_dynamic(0);
        assert_eq!(format!("{s}"), "[?, 3, 4]");
    }

    #[test]
    fn test_from_conversions() {
        let s1: Shape = vec![2i64, 3].into();
        let s2: Shape = (&[2i64, 3][..]).into();
        assert_eq!(s1, s2);
    }
}
