// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape-manipulation kernels: Reshape, Transpose, Concat, Split,
//! Gather, and Slice.
//!
//! These kernels are byte-generic where the semantics allow it, so index
//! tensors (`I64`) move through them unchanged.

use crate::op::{
    expect_arity, expect_output_shape, expect_single_output, resolve_axis, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{DType, Shape, Tensor};

// ── Reshape ────────────────────────────────────────────────────

/// Reinterprets the input with a new shape. The second input is the
/// target shape as an `I64` tensor; one `-1` entry is inferred from the
/// element count.
///
/// The CPU provider short-circuits this kernel and binds a zero-copy
/// view; the execute path below is the copying fallback used by
/// constant folding.
pub struct Reshape;

impl Reshape {
    pub fn factory(_attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self))
    }

    /// Resolves the target dims against `element_count`, expanding a
    /// single `-1` wildcard.
    pub fn resolve_target(
        target: &[i64],
        element_count: usize,
    ) -> Result<Vec<i64>, OpError> {
        let mut wildcard = None;
        let mut known: i64 = 1;
        for (i, &dim) in target.iter().enumerate() {
            if dim == -1 {
                if wildcard.is_some() {
                    return Err(OpError::InvalidArgument {
                        op: "Reshape",
                        detail: "only one dimension may be -1".into(),
                    });
                }
                wildcard = Some(i);
            } else if dim < 0 {
                return Err(OpError::InvalidArgument {
                    op: "Reshape",
                    detail: format!("negative dimension {dim}"),
                });
            } else {
                known *= dim.max(1);
            }
        }
        let mut dims = target.to_vec();
        if let Some(i) = wildcard {
            if known == 0 || element_count as i64 % known != 0 {
                return Err(OpError::InvalidArgument {
                    op: "Reshape",
                    detail: format!(
                        "cannot infer wildcard: {element_count} elements over {known}"
                    ),
                });
            }
            dims[i] = element_count as i64 / known;
        }
        let total: i64 = dims.iter().map(|&d| d.max(1)).product();
        if total != element_count as i64 {
            return Err(OpError::InvalidArgument {
                op: "Reshape",
                detail: format!("target {dims:?} does not hold {element_count} elements"),
            });
        }
        Ok(dims)
    }
}

impl Operator for Reshape {
    fn name(&self) -> &'static str {
        "Reshape"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Reshape", inputs, 2)?;
        if inputs[1].dtype() != DType::I64 {
            return Err(OpError::UnsupportedDType {
                op: "Reshape",
                dtype: inputs[1].dtype(),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "Reshape",
                detail: "requires data and shape inputs".into(),
            });
        }
        match inputs[1].tensor {
            Some(shape_tensor) => {
                let target = shape_tensor.as_i64();
                let dims = Self::resolve_target(target, inputs[0].shape.element_count())?;
                Ok(vec![ValueInfo::new(Shape::new(dims), inputs[0].dtype)])
            }
            None => {
                // Shape tensor is not a constant: every output dim is
                // dynamic; rank comes from the shape input's extent.
                let rank = inputs[1].shape.dim(0).unwrap_or(0).max(0) as usize;
                let mut shape = Shape::new(vec![-1; rank]);
                for i in 0..rank {
                    shape.mark_dynamic(i);
                }
                Ok(vec![ValueInfo::new(shape, inputs[0].dtype)])
            }
        }
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Reshape", outputs)?;
        if inputs[0].element_count() != outputs[0].element_count() {
            return Err(OpError::OutputShapeMismatch {
                op: "Reshape",
                expected: inputs[0].shape().clone(),
                actual: outputs[0].shape().clone(),
            });
        }
        outputs[0].bytes_mut()?.copy_from_slice(inputs[0].as_bytes());
        Ok(())
    }
}

// ── Transpose ──────────────────────────────────────────────────

/// Permutes dimensions. `perm` defaults to reversing them.
pub struct Transpose {
    perm: Option<Vec<i64>>,
}

impl Transpose {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            perm: attrs.get_i64s("perm").map(|p| p.to_vec()),
        }))
    }

    fn resolve_perm(&self, rank: usize) -> Result<Vec<usize>, OpError> {
        let perm: Vec<i64> = match &self.perm {
            Some(p) => p.clone(),
            None => (0..rank as i64).rev().collect(),
        };
        if perm.len() != rank {
            return Err(OpError::InvalidArgument {
                op: "Transpose",
                detail: format!("perm has {} entries for rank {rank}", perm.len()),
            });
        }
        let mut seen = vec![false; rank];
        let mut out = Vec::with_capacity(rank);
        for &p in &perm {
            if p < 0 || p >= rank as i64 || seen[p as usize] {
                return Err(OpError::InvalidArgument {
                    op: "Transpose",
                    detail: format!("invalid perm {perm:?}"),
                });
            }
            seen[p as usize] = true;
            out.push(p as usize);
        }
        Ok(out)
    }
}

impl Operator for Transpose {
    fn name(&self) -> &'static str {
        "Transpose"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Transpose", inputs, 1)?;
        self.resolve_perm(inputs[0].shape().rank())?;
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Transpose",
                detail: "requires 1 input".into(),
            });
        }
        let shape = inputs[0].shape;
        let perm = self.resolve_perm(shape.rank())?;
        let dims: Vec<i64> = perm.iter().map(|&p| shape.dims()[p]).collect();
        let dynamic: Vec<bool> = perm.iter().map(|&p| shape.is_dim_dynamic(p)).collect();
        Ok(vec![ValueInfo::new(
            Shape::with_dynamic(dims, dynamic),
            inputs[0].dtype,
        )])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Transpose", outputs)?;
        let infos =
            self.infer_shapes(&[InferenceInput::new(inputs[0].shape(), inputs[0].dtype())])?;
        expect_output_shape("Transpose", &outputs[0], &infos[0].shape)?;

        let in_shape = inputs[0].shape().clone();
        let rank = in_shape.rank();
        let perm = self.resolve_perm(rank)?;
        let in_strides = in_shape.strides();
        let out_dims = infos[0].shape.dims().to_vec();
        let elem = inputs[0].dtype().size_bytes();
        let total = inputs[0].element_count();

        let src = inputs[0].as_bytes();
        let dst = outputs[0].bytes_mut()?;

        // Walk output elements in order; map each back to its source.
        let mut out_index = vec![0i64; rank];
        for flat in 0..total {
            let mut rem = flat as i64;
            for d in (0..rank).rev() {
                let extent = out_dims[d].max(1);
                out_index[d] = rem % extent;
                rem /= extent;
            }
            let mut src_elem = 0i64;
            for d in 0..rank {
                src_elem += out_index[d] * in_strides[perm[d]];
            }
            let s = src_elem as usize * elem;
            let t = flat * elem;
            dst[t..t + elem].copy_from_slice(&src[s..s + elem]);
        }
        Ok(())
    }
}

// ── Concat ─────────────────────────────────────────────────────

/// Concatenates along `axis`; non-axis dims must match.
pub struct Concat {
    axis: i64,
}

impl Concat {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(0),
        }))
    }
}

impl Operator for Concat {
    fn name(&self) -> &'static str {
        "Concat"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Concat", inputs, 1)?;
        let first = inputs[0].shape();
        let axis = resolve_axis("Concat", self.axis, first.rank())?;
        for t in &inputs[1..] {
            let shape = t.shape();
            if shape.rank() != first.rank() {
                return Err(OpError::InvalidArgument {
                    op: "Concat",
                    detail: format!("rank mismatch: {first} vs {shape}"),
                });
            }
            for d in 0..first.rank() {
                if d != axis && shape.dims()[d] != first.dims()[d] {
                    return Err(OpError::InvalidArgument {
                        op: "Concat",
                        detail: format!("non-axis dim {d} differs: {first} vs {shape}"),
                    });
                }
            }
            if t.dtype() != inputs[0].dtype() {
                return Err(OpError::UnsupportedDType {
                    op: "Concat",
                    dtype: t.dtype(),
                });
            }
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Concat",
                detail: "requires at least 1 input".into(),
            });
        }
        let first = inputs[0].shape;
        let axis = resolve_axis("Concat", self.axis, first.rank())?;
        let mut dims = first.dims().to_vec();
        dims[axis] = inputs.iter().map(|i| i.shape.dims()[axis]).sum();
        Ok(vec![ValueInfo::new(Shape::new(dims), inputs[0].dtype)])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Concat", outputs)?;
        let infos: Vec<InferenceInput<'_>> = inputs
            .iter()
            .map(|t| InferenceInput::new(t.shape(), t.dtype()))
            .collect();
        let expected = self.infer_shapes(&infos)?;
        expect_output_shape("Concat", &outputs[0], &expected[0].shape)?;

        let first = inputs[0].shape();
        let axis = resolve_axis("Concat", self.axis, first.rank())?;
        let elem = inputs[0].dtype().size_bytes();
        let outer: i64 = first.dims()[..axis].iter().product();
        let inner: i64 = first.dims()[axis + 1..].iter().map(|&d| d.max(1)).product();
        let out_axis: i64 = expected[0].shape.dims()[axis];

        let dst = outputs[0].bytes_mut()?;
        let mut axis_offset: i64 = 0;
        for input in inputs {
            let in_axis = input.shape().dims()[axis];
            let src = input.as_bytes();
            let block = (in_axis * inner) as usize * elem;
            let out_stride = (out_axis * inner) as usize * elem;
            for o in 0..outer as usize {
                let s = o * block;
                let t = o * out_stride + (axis_offset * inner) as usize * elem;
                dst[t..t + block].copy_from_slice(&src[s..s + block]);
            }
            axis_offset += in_axis;
        }
        Ok(())
    }
}

// ── Split ──────────────────────────────────────────────────────

/// Splits along `axis` into parts given by the `split` attribute, or
/// into equal parts (remainder spread over the leading outputs).
///
/// The number of outputs during shape inference comes from the `split`
/// attribute when present, else the `num_outputs` attribute (default 2).
pub struct Split {
    axis: i64,
    sizes: Option<Vec<i64>>,
    num_outputs: usize,
}

impl Split {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(0),
            sizes: attrs.get_i64s("split").map(|s| s.to_vec()),
            num_outputs: attrs.get_i64("num_outputs").unwrap_or(2).max(1) as usize,
        }))
    }

    fn resolve_sizes(&self, axis_len: i64, count: usize) -> Result<Vec<i64>, OpError> {
        if let Some(sizes) = &self.sizes {
            let total: i64 = sizes.iter().sum();
            if total != axis_len {
                return Err(OpError::InvalidArgument {
                    op: "Split",
                    detail: format!("split sizes sum to {total}, axis has {axis_len}"),
                });
            }
            return Ok(sizes.clone());
        }
        let base = axis_len / count as i64;
        let remainder = axis_len % count as i64;
        Ok((0..count as i64)
            .map(|i| base + i64::from(i < remainder))
            .collect())
    }
}

impl Operator for Split {
    fn name(&self) -> &'static str {
        "Split"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Split", inputs, 1)?;
        resolve_axis("Split", self.axis, inputs[0].shape().rank())?;
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Split",
                detail: "requires 1 input".into(),
            });
        }
        let shape = inputs[0].shape;
        let axis = resolve_axis("Split", self.axis, shape.rank())?;
        let count = self.sizes.as_ref().map(|s| s.len()).unwrap_or(self.num_outputs);
        let sizes = self.resolve_sizes(shape.dims()[axis], count)?;
        Ok(sizes
            .into_iter()
            .map(|size| {
                let mut dims = shape.dims().to_vec();
                dims[axis] = size;
                ValueInfo::new(Shape::new(dims), inputs[0].dtype)
            })
            .collect())
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        if outputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Split",
                detail: "requires at least 1 output".into(),
            });
        }
        let shape = inputs[0].shape().clone();
        let axis = resolve_axis("Split", self.axis, shape.rank())?;
        let sizes = self.resolve_sizes(shape.dims()[axis], outputs.len())?;
        if sizes.len() != outputs.len() {
            return Err(OpError::InvalidArgument {
                op: "Split",
                detail: format!("{} split sizes for {} outputs", sizes.len(), outputs.len()),
            });
        }

        let elem = inputs[0].dtype().size_bytes();
        let outer: i64 = shape.dims()[..axis].iter().product();
        let inner: i64 = shape.dims()[axis + 1..].iter().map(|&d| d.max(1)).product();
        let in_axis = shape.dims()[axis];
        let src = inputs[0].as_bytes();

        let mut axis_offset: i64 = 0;
        for (output, &size) in outputs.iter_mut().zip(&sizes) {
            let mut dims = shape.dims().to_vec();
            dims[axis] = size;
            expect_output_shape("Split", output, &Shape::new(dims))?;

            let block = (size * inner) as usize * elem;
            let in_stride = (in_axis * inner) as usize * elem;
            let dst = output.bytes_mut()?;
            for o in 0..outer as usize {
                let s = o * in_stride + (axis_offset * inner) as usize * elem;
                let t = o * block;
                dst[t..t + block].copy_from_slice(&src[s..s + block]);
            }
            axis_offset += size;
        }
        Ok(())
    }
}

// ── Gather ─────────────────────────────────────────────────────

/// Gathers slices of the data input at `axis` positions given by an
/// `I64` index tensor. Indices are bounds-checked.
pub struct Gather {
    axis: i64,
}

impl Gather {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            axis: attrs.get_i64("axis").unwrap_or(0),
        }))
    }
}

impl Operator for Gather {
    fn name(&self) -> &'static str {
        "Gather"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Gather", inputs, 2)?;
        if inputs[1].dtype() != DType::I64 {
            return Err(OpError::UnsupportedDType {
                op: "Gather",
                dtype: inputs[1].dtype(),
            });
        }
        resolve_axis("Gather", self.axis, inputs[0].shape().rank())?;
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "Gather",
                detail: "requires data and indices".into(),
            });
        }
        let data = inputs[0].shape;
        let indices = inputs[1].shape;
        let axis = resolve_axis("Gather", self.axis, data.rank())?;
        let mut dims = Vec::with_capacity(data.rank() - 1 + indices.rank());
        dims.extend_from_slice(&data.dims()[..axis]);
        dims.extend_from_slice(indices.dims());
        dims.extend_from_slice(&data.dims()[axis + 1..]);
        Ok(vec![ValueInfo::new(Shape::new(dims), inputs[0].dtype)])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Gather", outputs)?;
        let infos = self.infer_shapes(&[
            InferenceInput::new(inputs[0].shape(), inputs[0].dtype()),
            InferenceInput::new(inputs[1].shape(), inputs[1].dtype()),
        ])?;
        expect_output_shape("Gather", &outputs[0], &infos[0].shape)?;

        let data_shape = inputs[0].shape();
        let axis = resolve_axis("Gather", self.axis, data_shape.rank())?;
        let axis_len = data_shape.dims()[axis];
        let elem = inputs[0].dtype().size_bytes();
        let outer: i64 = data_shape.dims()[..axis].iter().product();
        let inner: i64 = data_shape.dims()[axis + 1..]
            .iter()
            .map(|&d| d.max(1))
            .product();

        let indices = inputs[1].as_i64().to_vec();
        let index_count = indices.len() as i64;
        let src = inputs[0].as_bytes();
        let dst = outputs[0].bytes_mut()?;

        let block = inner as usize * elem;
        for (pos, &idx) in indices.iter().enumerate() {
            if idx < 0 || idx >= axis_len {
                return Err(OpError::InvalidArgument {
                    op: "Gather",
                    detail: format!("index {idx} out of range for axis extent {axis_len}"),
                });
            }
            for o in 0..outer {
                let s = ((o * axis_len + idx) * inner) as usize * elem;
                let t = ((o * index_count + pos as i64) * inner) as usize * elem;
                dst[t..t + block].copy_from_slice(&src[s..s + block]);
            }
        }
        Ok(())
    }
}

// ── Slice ──────────────────────────────────────────────────────

/// Slices the data input. `starts`/`ends`/`axes`/`steps` come from
/// attributes, or from trailing `I64` inputs when the attributes are
/// absent (the interchange operator's newer form).
pub struct Slice {
    starts: Option<Vec<i64>>,
    ends: Option<Vec<i64>>,
    axes: Option<Vec<i64>>,
    steps: Option<Vec<i64>>,
}

struct SliceSpec {
    starts: Vec<i64>,
    ends: Vec<i64>,
    steps: Vec<i64>,
}

impl Slice {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            starts: attrs.get_i64s("starts").map(|s| s.to_vec()),
            ends: attrs.get_i64s("ends").map(|s| s.to_vec()),
            axes: attrs.get_i64s("axes").map(|s| s.to_vec()),
            steps: attrs.get_i64s("steps").map(|s| s.to_vec()),
        }))
    }

    /// Builds full-rank start/end/step lists. `tensor_at` supplies the
    /// trailing-input tensors (index 1 = starts, 2 = ends, 3 = axes,
    /// 4 = steps) when attributes are absent; returning `None` for a
    /// required tensor means the slice is not yet resolvable.
    fn resolve<'a>(
        &self,
        rank: usize,
        dims: &[i64],
        tensor_at: impl Fn(usize) -> Option<&'a Tensor>,
    ) -> Result<Option<SliceSpec>, OpError> {
        let from_input = |index: usize| -> Option<Vec<i64>> {
            tensor_at(index)
                .filter(|t| t.dtype() == DType::I64)
                .map(|t| t.as_i64().to_vec())
        };
        let starts = match self.starts.clone().or_else(|| from_input(1)) {
            Some(s) => s,
            None => return Ok(None),
        };
        let ends = match self.ends.clone().or_else(|| from_input(2)) {
            Some(e) => e,
            None => return Ok(None),
        };
        let axes = self
            .axes
            .clone()
            .or_else(|| from_input(3))
            .unwrap_or_else(|| (0..starts.len() as i64).collect());
        let steps = self
            .steps
            .clone()
            .or_else(|| from_input(4))
            .unwrap_or_else(|| vec![1; axes.len()]);

        if starts.len() != axes.len() || ends.len() != axes.len() || steps.len() != axes.len() {
            return Err(OpError::InvalidArgument {
                op: "Slice",
                detail: "starts, ends, axes, and steps must have equal length".into(),
            });
        }

        let mut full = SliceSpec {
            starts: vec![0; rank],
            ends: dims.to_vec(),
            steps: vec![1; rank],
        };
        for (i, &axis) in axes.iter().enumerate() {
            let a = resolve_axis("Slice", axis, rank)?;
            full.starts[a] = starts[i];
            full.ends[a] = ends[i];
            full.steps[a] = steps[i];
        }
        Ok(Some(full))
    }
}

impl Operator for Slice {
    fn name(&self) -> &'static str {
        "Slice"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Slice", inputs, 1)?;
        if let Some(steps) = &self.steps {
            if steps.contains(&0) {
                return Err(OpError::InvalidArgument {
                    op: "Slice",
                    detail: "step is zero".into(),
                });
            }
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: "Slice",
                detail: "requires a data input".into(),
            });
        }
        let shape = inputs[0].shape;
        let rank = shape.rank();
        let spec = self.resolve(rank, shape.dims(), |i| {
            inputs.get(i).and_then(|input| input.tensor)
        })?;
        match spec {
            Some(spec) => {
                let mut dims = Vec::with_capacity(rank);
                for d in 0..rank {
                    dims.push(slice_extent(
                        shape.dims()[d],
                        spec.starts[d],
                        spec.ends[d],
                        spec.steps[d],
                    )?);
                }
                Ok(vec![ValueInfo::new(Shape::new(dims), inputs[0].dtype)])
            }
            None => {
                // Index tensors are runtime values: dims unresolvable.
                let mut shape = Shape::new(vec![-1; rank]);
                for d in 0..rank {
                    shape.mark_dynamic(d);
                }
                Ok(vec![ValueInfo::new(shape, inputs[0].dtype)])
            }
        }
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Slice", outputs)?;
        let shape = inputs[0].shape();
        let spec = self
            .resolve(shape.rank(), shape.dims(), |i| inputs.get(i).copied())?
            .ok_or_else(|| OpError::InvalidArgument {
                op: "Slice",
                detail: "starts/ends unavailable (neither attributes nor inputs)".into(),
            })?;

        let sliced = inputs[0].slice(&spec.starts, &spec.ends, &spec.steps)?;
        expect_output_shape("Slice", &outputs[0], sliced.shape())?;
        outputs[0].bytes_mut()?.copy_from_slice(sliced.as_bytes());
        Ok(())
    }
}

/// Output extent of one sliced dimension, after negative-index
/// resolution and clamping.
fn slice_extent(dim: i64, start: i64, end: i64, step: i64) -> Result<i64, OpError> {
    if step == 0 {
        return Err(OpError::InvalidArgument {
            op: "Slice",
            detail: "step is zero".into(),
        });
    }
    let mut s = if start < 0 { start + dim } else { start };
    let mut e = if end < 0 { end + dim } else { end };
    s = s.clamp(0, dim);
    e = e.clamp(0, dim);
    let extent = if step > 0 {
        ((e - s) + step - 1).div_euclid(step)
    } else {
        ((s - e) + (-step) - 1).div_euclid(-step)
    };
    Ok(extent.max(0))
}
