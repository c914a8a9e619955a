// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D convolution over NCHW input.

use crate::op::{
    expect_arity, expect_f32, expect_output_shape, expect_single_output, ExecutionContext,
    InferenceInput, Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{Shape, Tensor};

/// Spatial hyper-parameters shared by Conv and the fused Conv kernel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvParams {
    pub stride: (i64, i64),
    pub pad: (i64, i64),
    pub dilation: (i64, i64),
}

impl ConvParams {
    pub(crate) fn from_attrs(attrs: &Attributes) -> Self {
        let pair = |name: &str, default: i64| -> (i64, i64) {
            match attrs.get_i64s(name) {
                Some([h, w, ..]) => (*h, *w),
                Some([v]) => (*v, *v),
                _ => (default, default),
            }
        };
        Self {
            stride: pair("strides", 1),
            pad: pair("pads", 0),
            dilation: pair("dilations", 1),
        }
    }

    /// `(out_h, out_w)` for the given input and kernel extents.
    pub(crate) fn output_hw(&self, in_h: i64, in_w: i64, k_h: i64, k_w: i64) -> (i64, i64) {
        let out_h =
            (in_h + 2 * self.pad.0 - self.dilation.0 * (k_h - 1) - 1) / self.stride.0 + 1;
        let out_w =
            (in_w + 2 * self.pad.1 - self.dilation.1 * (k_w - 1) - 1) / self.stride.1 + 1;
        (out_h, out_w)
    }
}

/// Direct 2-D convolution: input `[N,C,H,W]`, weight `[O,C,kH,kW]`,
/// optional bias `[O]`.
pub struct Conv {
    params: ConvParams,
}

impl Conv {
    pub fn factory(attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self {
            params: ConvParams::from_attrs(attrs),
        }))
    }
}

impl Operator for Conv {
    fn name(&self) -> &'static str {
        "Conv"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Conv", inputs, 2)?;
        expect_f32("Conv", inputs[0])?;
        expect_f32("Conv", inputs[1])?;
        let x = inputs[0].shape();
        let w = inputs[1].shape();
        if x.rank() != 4 || w.rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: "Conv",
                detail: format!("input and weight must be 4-D (NCHW), got {x} and {w}"),
            });
        }
        if x.dims()[1] != w.dims()[1] {
            return Err(OpError::InvalidArgument {
                op: "Conv",
                detail: format!(
                    "input channels {} disagree with weight channels {}",
                    x.dims()[1],
                    w.dims()[1]
                ),
            });
        }
        if inputs.len() > 2 && inputs[2].element_count() as i64 != w.dims()[0] {
            return Err(OpError::InvalidArgument {
                op: "Conv",
                detail: format!(
                    "bias has {} elements, expected {}",
                    inputs[2].element_count(),
                    w.dims()[0]
                ),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "Conv",
                detail: "requires input and weight".into(),
            });
        }
        let x = inputs[0].shape;
        let w = inputs[1].shape;
        if x.rank() != 4 || w.rank() != 4 {
            return Err(OpError::InvalidArgument {
                op: "Conv",
                detail: format!("input and weight must be 4-D, got {x} and {w}"),
            });
        }
        let (out_h, out_w) =
            self.params
                .output_hw(x.dims()[2], x.dims()[3], w.dims()[2], w.dims()[3]);
        let dims = vec![x.dims()[0], w.dims()[0], out_h, out_w];
        let dynamic = vec![x.is_dim_dynamic(0), false, x.is_dim_dynamic(2), x.is_dim_dynamic(3)];
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
        expect_single_output("Conv", outputs)?;
        let infos = self.infer_shapes(&[
            InferenceInput::new(inputs[0].shape(), inputs[0].dtype()),
            InferenceInput::new(inputs[1].shape(), inputs[1].dtype()),
        ])?;
        expect_output_shape("Conv", &outputs[0], &infos[0].shape)?;

        let bias = inputs.get(2).map(|t| t.as_f32());
        conv2d_direct(
            inputs[0].as_f32(),
            inputs[1].as_f32(),
            bias,
            outputs[0].as_f32_mut()?,
            inputs[0].shape(),
            inputs[1].shape(),
            &infos[0].shape,
            self.params,
            |acc| acc,
        );
        Ok(())
    }
}

/// The shared direct-convolution loop nest.
///
/// `post` runs once per output element after bias accumulation — the
/// fused kernel uses it to fold in the BatchNorm affine and ReLU.
#[allow(clippy::too_many_arguments)]
pub(crate) fn conv2d_direct(
    x: &[f32],
    w: &[f32],
    bias: Option<&[f32]>,
    out: &mut [f32],
    x_shape: &Shape,
    w_shape: &Shape,
    out_shape: &Shape,
    params: ConvParams,
    post: impl Fn(f32) -> f32,
) {
    let [batch, in_c, in_h, in_w] = [
        x_shape.dims()[0],
        x_shape.dims()[1],
        x_shape.dims()[2],
        x_shape.dims()[3],
    ];
    let [out_c, k_h, k_w] = [w_shape.dims()[0], w_shape.dims()[2], w_shape.dims()[3]];
    let [out_h, out_w] = [out_shape.dims()[2], out_shape.dims()[3]];

    for n in 0..batch {
        for oc in 0..out_c {
            let b = bias.map(|b| b[oc as usize]).unwrap_or(0.0);
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut sum = b;
                    for ic in 0..in_c {
                        for kh in 0..k_h {
                            let ih = oh * params.stride.0 + kh * params.dilation.0 - params.pad.0;
                            if ih < 0 || ih >= in_h {
                                continue;
                            }
                            for kw in 0..k_w {
                                let iw =
                                    ow * params.stride.1 + kw * params.dilation.1 - params.pad.1;
                                if iw < 0 || iw >= in_w {
                                    continue;
                                }
                                let x_idx = ((n * in_c + ic) * in_h + ih) * in_w + iw;
                                let w_idx = ((oc * in_c + ic) * k_h + kh) * k_w + kw;
                                sum += x[x_idx as usize] * w[w_idx as usize];
                            }
                        }
                    }
                    let out_idx = ((n * out_c + oc) * out_h + oh) * out_w + ow;
                    out[out_idx as usize] = post(sum);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::Attribute;
    use memory_manager::DeviceKind;
    use tensor_core::DType;

    fn run_conv(
        x: &Tensor,
        w: &Tensor,
        bias: Option<&Tensor>,
        attrs: &Attributes,
    ) -> Tensor {
        let op = Conv::factory(attrs).unwrap();
        let infos = op
            .infer_shapes(&[
                InferenceInput::new(x.shape(), DType::F32),
                InferenceInput::new(w.shape(), DType::F32),
            ])
            .unwrap();
        let mut outputs = vec![Tensor::new(
            infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        let mut inputs: Vec<&Tensor> = vec![x, w];
        if let Some(b) = bias {
            inputs.push(b);
        }
        op.execute(&inputs, &mut outputs, &ExecutionContext::default())
            .unwrap();
        outputs.remove(0)
    }

    #[test]
    fn test_conv_1x1_kernel_is_scaling() {
        // 1x1 kernel with weight 2.0 doubles every element.
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 2, 2]), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[2.0]).unwrap();
        let out = run_conv(&x, &w, None, &Attributes::new());
        assert_eq!(out.shape().dims(), &[1, 1, 2, 2]);
        assert_eq!(out.as_f32(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_conv_full_kernel_yields_1x1() {
        // kernel == input spatial, no padding → 1x1 output (the sum).
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 3, 3]), &[1.0; 9]).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 3, 3]), &[1.0; 9]).unwrap();
        let out = run_conv(&x, &w, None, &Attributes::new());
        assert_eq!(out.shape().dims(), &[1, 1, 1, 1]);
        assert!((out.as_f32()[0] - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_conv_bias_added() {
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[3.0]).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[2.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(1), &[10.0]).unwrap();
        let out = run_conv(&x, &w, Some(&b), &Attributes::new());
        assert!((out.as_f32()[0] - 16.0).abs() < 1e-5);
    }

    #[test]
    fn test_conv_stride() {
        let x = Tensor::from_f32(
            Shape::new(vec![1, 1, 4, 4]),
            &(0..16).map(|i| i as f32).collect::<Vec<_>>(),
        )
        .unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[1.0]).unwrap();
        let mut attrs = Attributes::new();
        attrs.set("strides", Attribute::I64s(vec![2, 2]));
        let out = run_conv(&x, &w, None, &attrs);
        assert_eq!(out.shape().dims(), &[1, 1, 2, 2]);
        assert_eq!(out.as_f32(), &[0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_conv_padding_grows_output() {
        let x = Tensor::from_f32(Shape::new(vec![1, 1, 2, 2]), &[1.0; 4]).unwrap();
        let w = Tensor::from_f32(Shape::new(vec![1, 1, 3, 3]), &[1.0; 9]).unwrap();
        let mut attrs = Attributes::new();
        attrs.set("pads", Attribute::I64s(vec![1, 1]));
        let out = run_conv(&x, &w, None, &attrs);
        assert_eq!(out.shape().dims(), &[1, 1, 2, 2]);
        // Every output cell sees all four ones.
        assert_eq!(out.as_f32(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_conv_channel_mismatch_rejected() {
        let x = Tensor::new(Shape::new(vec![1, 2, 4, 4]), DType::F32, DeviceKind::Cpu).unwrap();
        let w = Tensor::new(Shape::new(vec![1, 3, 3, 3]), DType::F32, DeviceKind::Cpu).unwrap();
        let op = Conv::factory(&Attributes::new()).unwrap();
        assert!(op.validate(&[&x, &w]).is_err());
    }
}
