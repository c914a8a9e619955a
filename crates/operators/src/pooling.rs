// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Spatial pooling over NCHW input.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{Shape, Tensor};

#[derive(Debug, Clone, Copy)]
struct PoolParams {
    kernel: (i64, i64),
    stride: (i64, i64),
    pad: (i64, i64),
}

impl PoolParams {
    fn from_attrs(attrs: &Attributes) -> Self {
        let pair = |name: &str| -> Option<(i64, i64)> {
            match attrs.get_i64s(name) {
                Some([h, w, ..]) => Some((*h, *w)),
                Some([v]) => Some((*v, *v)),
                _ => None,
            }
        };
        let kernel = pair("kernel_shape").unwrap_or((2, 2));
        Self {
            kernel,
            // Stride defaults to the kernel extent (non-overlapping windows).
            stride: pair("strides").unwrap_or(kernel),
            pad: pair("pads").unwrap_or((0, 0)),
        }
    }

    fn output_hw(&self, in_h: i64, in_w: i64) -> (i64, i64) {
        let out_h = (in_h + 2 * self.pad.0 - self.kernel.0) / self.stride.0 + 1;
        let out_w = (in_w + 2 * self.pad.1 - self.kernel.1) / self.stride.1 + 1;
        (out_h, out_w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PoolKind {
    Max,
    Average,
}

/// Windowed pooling; the kind decides max vs. mean reduction. Average
/// pooling counts only valid (non-padding) cells.
pub struct Pool {
    kind: PoolKind,
    params: PoolParams,
}

impl Pool {
    pub fn max_factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            kind: PoolKind::Max,
            params: PoolParams::from_attrs(attrs),
        }))
    }

    pub fn average_factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            kind: PoolKind::Average,
            params: PoolParams::from_attrs(attrs),
        }))
    }
}

impl Operator for Pool {
    fn name(&self) -> &'static str {
        match self.kind {
            PoolKind::Max => "MaxPool",
            PoolKind::Average => "AveragePool",
        }
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity(self.name(), inputs, 1)?;
        expect_f32(self.name(), inputs[0])?;
        if inputs[0].shape().rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: self.name(),
                detail: format!("input must be 4-D (NCHW), got {}", inputs[0].shape()),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.is_empty() {
            return Err(OpError::InvalidArgument {
                op: self.name(),
                detail: "requires 1 input".into(),
            });
        }
        let x = inputs[0].shape;
        if x.rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: self.name(),
                detail: format!("input must be 4-D, got {x}"),
            });
        }
        let (out_h, out_w) = self.params.output_hw(x.dims()[2], x.dims()[3]);
        let dims = vec![x.dims()[0], x.dims()[1], out_h, out_w];
        let dynamic = vec![
            x.is_dim_dynamic(0),
            x.is_dim_dynamic(1),
            x.is_dim_dynamic(2),
            x.is_dim_dynamic(3),
        ];
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
        expect_single_output(self.name(), outputs)?;
        let infos =
            self.infer_shapes(&[InferenceInput::new(inputs[0].shape(), inputs[0].dtype())])?;
        expect_output_shape(self.name(), &outputs[0], &infos[0].shape)?;

        let dims = inputs[0].shape().dims().to_vec();
        let [batch, channels, in_h, in_w] = [dims[0], dims[1], dims[2], dims[3]];
        let out_dims = infos[0].shape.dims().to_vec();
        let [out_h, out_w] = [out_dims[2], out_dims[3]];

        let x = inputs[0].as_f32();
        let out = outputs[0].as_f32_mut()?;
        let p = self.params;

        for n in 0..batch {
            for c in 0..channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut max_val = f32::NEG_INFINITY;
                        let mut sum = 0.0f32;
                        let mut valid = 0usize;
                        for kh in 0..p.kernel.0 {
                            let ih = oh * p.stride.0 + kh - p.pad.0;
                            if ih < 0 || ih >= in_h {
                                continue;
                            }
                            for kw in 0..p.kernel.1 {
                                let iw = ow * p.stride.1 + kw - p.pad.1;
                                if iw < 0 || iw >= in_w {
                                    continue;
                                }
                                let idx = ((n * channels + c) * in_h + ih) * in_w + iw;
                                let v = x[idx as usize];
                                max_val = max_val.max(v);
                                sum += v;
                                valid += 1;
                            }
                        }
                        let out_idx = ((n * channels + c) * out_h + oh) * out_w + ow;
                        out[out_idx as usize] = match self.kind {
                            PoolKind::Max => max_val,
                            PoolKind::Average => {
                                if valid > 0 {
                                    sum / valid as f32
                                } else {
                                    0.0
                                }
                            }
                        };
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::Attribute;
    use memory_manager::DeviceKind;
    use tensor_core::DType;

    fn run(op: Box<dyn Operator>, x: &Tensor) -> Tensor {
        let infos = op
            .infer_shapes(&[InferenceInput::new(x.shape(), DType::F32)])
            .unwrap();
        let mut outputs = vec![Tensor::new(
            infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        op.execute(&[x], &mut outputs, &ExecutionContext::default())
            .unwrap();
        outputs.remove(0)
    }

    #[test]
    fn test_maxpool_2x2() {
        let x = Tensor::from_f32(
            Shape::new(vec![1, 1, 4, 4]),
            &(0..16).map(|i| i as f32).collect::<Vec<_>>(),
        )
        .unwrap();
        let out = run(Pool::max_factory(&Attributes::new()).unwrap(), &x);
        assert_eq!(out.shape().dims(), &[1, 1, 2, 2]);
        assert_eq!(out.as_f32(), &[5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn test_avgpool_2x2() {
        let x = Tensor::from_f32(
            Shape::new(vec![1, 1, 2, 2]),
            &[1.0, 3.0, 5.0, 7.0],
        )
        .unwrap();
        let out = run(Pool::average_factory(&Attributes::new()).unwrap(), &x);
        assert_eq!(out.shape().dims(), &[1, 1, 1, 1]);
        assert!((out.as_f32()[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_avgpool_padding_counts_valid_only() {
        // With 1-pixel padding on a single cell, the corner windows see
        // one valid element — the average divides by 1, not 4.
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[8.0]).unwrap();
        let mut attrs = Attributes::new();
        attrs.set("kernel_shape", Attribute::I64s(vec![2, 2]));
        attrs.set("strides", Attribute::I64s(vec![1, 1]));
        attrs.set("pads", Attribute::I64s(vec![1, 1]));
        let out = run(Pool::average_factory(&attrs).unwrap(), &x);
        assert_eq!(out.shape().dims(), &[1, 1, 2, 2]);
        for &v in out.as_f32() {
            assert!((v - 8.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pool_kernel_equals_input() {
        let x = Tensor::from_f32(
            Shape::new(vec![1, 1, 3, 3]),
            &[1.0, 2.0, 3.0, 4.0, 9.0, 5.0, 6.0, 7.0, 8.0],
        )
        .unwrap();
        let mut attrs = Attributes::new();
        attrs.set("kernel_shape", Attribute::I64s(vec![3, 3]));
        let out = run(Pool::max_factory(&attrs).unwrap(), &x);
        assert_eq!(out.shape().dims(), &[1, 1, 1, 1]);
        assert_eq!(out.as_f32()[0], 9.0);
    }

    #[test]
    fn test_pool_rejects_non_4d() {
        let x = Tensor::from_f32(Shape::matrix(2, 2), &[1.0; 4]).unwrap();
        let op = Pool::max_factory(&Attributes::new()).unwrap();
        assert!(op.validate(&[&x]).is_err());
    }
}
