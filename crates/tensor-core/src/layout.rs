// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Physical memory layouts for 4-D and 5-D image tensors.

/// The physical ordering of dimensions in a tensor's buffer.
///
/// Only 4-D/5-D image tensors carry a meaningful layout; everything else
/// defaults to `Nchw` and ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TensorLayout {
    /// Batch, channel, height, width. The default for CPU kernels.
    Nchw,
    /// Batch, height, width, channel.
    Nhwc,
    /// 3-D: batch, channel, depth, height, width.
    Ncdhw,
    /// 3-D: batch, depth, height, width, channel.
    Ndhwc,
}

impl TensorLayout {
    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            TensorLayout::Nchw => "NCHW",
            TensorLayout::Nhwc => "NHWC",
            TensorLayout::Ncdhw => "NCDHW",
            TensorLayout::Ndhwc => "NDHWC",
        }
    }

    /// The transpose permutation that converts `self` into `to`.
    ///
    /// Returns `None` when no 4-D permutation relates the two layouts
    /// (5-D layouts, or identical layouts, where the caller needs no
    /// transpose at all).
    pub fn perm_to(self, to: TensorLayout) -> Option<Vec<i64>> {
        match (self, to) {
            (TensorLayout::Nchw, TensorLayout::Nhwc) => Some(vec![0, 2, 3, 1]),
            (TensorLayout::Nhwc, TensorLayout::Nchw) => Some(vec![0, 3, 1, 2]),
            _ => None,
        }
    }
}

impl Default for TensorLayout {
    fn default() -> Self {
        TensorLayout::Nchw
    }
}

impl std::fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perm_nchw_nhwc() {
        assert_eq!(
            TensorLayout::Nchw.perm_to(TensorLayout::Nhwc),
            Some(vec![0, 2, 3, 1])
        );
        assert_eq!(
            TensorLayout::Nhwc.perm_to(TensorLayout::Nchw),
            Some(vec![0, 3, 1, 2])
        );
    }

    #[test]
    fn test_perm_identity_is_none() {
        assert_eq!(TensorLayout::Nchw.perm_to(TensorLayout::Nchw), None);
    }

    #[test]
    fn test_default() {
        assert_eq!(TensorLayout::default(), TensorLayout::Nchw);
    }
}
