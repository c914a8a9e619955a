// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

/// Enumerates the element types a [`crate::Tensor`] can hold.
///
/// The runtime uses `DType` to decide buffer sizes, alignment, and which
/// compute kernels to dispatch. The baseline CPU kernels operate on `F32`
/// (and `I64` for index tensors); the remaining types exist so that loaded
/// graphs can carry them through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer (index tensors).
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// Boolean, stored one byte per element.
    Bool,
    /// Variable-length string. Carries no fixed element size.
    String,
    /// Placeholder for values whose dtype has not been inferred yet.
    Unknown,
}

impl DType {
    /// Returns the size of a single element in bytes.
    ///
    /// `String` and `Unknown` have no fixed element size and return 0.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::U8 => 1,
            DType::U16 => 2,
            DType::U32 => 4,
            DType::U64 => 8,
            DType::Bool => 1,
            DType::String | DType::Unknown => 0,
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Unknown => "unknown",
        }
    }

    /// Parses the label produced by [`as_str`](DType::as_str).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let dtype = match s {
            "f32" | "float32" | "float" => DType::F32,
            "f16" | "float16" => DType::F16,
            "bf16" | "bfloat16" => DType::BF16,
            "i8" => DType::I8,
            "i16" => DType::I16,
            "i32" => DType::I32,
            "i64" => DType::I64,
            "u8" => DType::U8,
            "u16" => DType::U16,
            "u32" => DType::U32,
            "u64" => DType::U64,
            "bool" => DType::Bool,
            "string" => DType::String,
            "unknown" => DType::Unknown,
            _ => return None,
        };
        Some(dtype)
    }

    /// Maps the interchange format's numeric dtype tag onto a `DType`.
    ///
    /// Tags 11 (f64), 14 (complex64), and 15 (complex128) are downcast to
    /// `F32`; this is the only lossy mapping and the loader documents it.
    /// Unrecognised tags map to `Unknown`.
    pub fn from_interchange_tag(tag: u32) -> Self {
        match tag {
            1 => DType::F32,
            2 => DType::U8,
            3 => DType::I8,
            4 => DType::U16,
            5 => DType::I16,
            6 => DType::I32,
            7 => DType::I64,
            8 => DType::String,
            9 => DType::Bool,
            10 => DType::F16,
            16 => DType::BF16,
            11 | 14 | 15 => DType::F32,
            _ => DType::Unknown,
        }
    }

    /// The numeric tag used by the wire form of [`crate::Tensor`].
    ///
    /// Matches the interchange tags where they exist; `U32`/`U64` use the
    /// two tags the interchange format leaves unassigned in our mapping.
    pub fn wire_tag(self) -> u32 {
        match self {
            DType::F32 => 1,
            DType::U8 => 2,
            DType::I8 => 3,
            DType::U16 => 4,
            DType::I16 => 5,
            DType::I32 => 6,
            DType::I64 => 7,
            DType::String => 8,
            DType::Bool => 9,
            DType::F16 => 10,
            DType::U32 => 12,
            DType::U64 => 13,
            DType::BF16 => 16,
            DType::Unknown => 0,
        }
    }

    /// Inverse of [`wire_tag`](DType::wire_tag).
    pub fn from_wire_tag(tag: u32) -> Option<Self> {
        let dtype = match tag {
            0 => DType::Unknown,
            1 => DType::F32,
            2 => DType::U8,
            3 => DType::I8,
            4 => DType::U16,
            5 => DType::I16,
            6 => DType::I32,
            7 => DType::I64,
            8 => DType::String,
            9 => DType::Bool,
            10 => DType::F16,
            12 => DType::U32,
            13 => DType::U64,
            16 => DType::BF16,
            _ => return None,
        };
        Some(dtype)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
