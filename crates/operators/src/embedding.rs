// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Token embedding lookup.

use crate::op::{
    expect_arity, expect_output_shape, expect_single_output, ExecutionContext, InferenceInput,
    Operator, ValueInfo,
};
use crate::OpError;
use graph_ir::Attributes;
use tensor_core::{DType, Shape, Tensor};

/// Embedding lookup: `ids` is any-rank `I64`, `weight` is `[V, E]`
/// `F32`; output is `ids.shape × E`. Ids are bounds-checked against the
/// vocabulary extent.
pub struct Embedding;

impl Embedding {
    pub fn factory(_attrs: &Attributes) -> Result<Box<dyn Operator>, OpError> {
        Ok(Box::new(Self))
    }
}

impl Operator for Embedding {
    fn name(&self) -> &'static str {
        "Embedding"
    }

    fn validate(&self, inputs: &[&Tensor]) -> Result<(), OpError> {
        expect_arity("Embedding", inputs, 2)?;
        if inputs[0].dtype() != DType::I64 {
            return Err(OpError::UnsupportedDType {
                op: "Embedding",
                dtype: inputs[0].dtype(),
            });
        }
        if inputs[1].dtype() != DType::F32 {
            return Err(OpError::UnsupportedDType {
                op: "Embedding",
                dtype: inputs[1].dtype(),
            });
        }
        if inputs[1].shape().rank() != 2 {
            return Err(OpError::InvalidArgument {
                op: "Embedding",
                detail: format!("weight must be [V, E], got {}", inputs[1].shape()),
            });
        }
        Ok(())
    }

    fn infer_shapes(&self, inputs: &[InferenceInput<'_>]) -> Result<Vec<ValueInfo>, OpError> {
        if inputs.len() < 2 {
            return Err(OpError::InvalidArgument {
                op: "Embedding",
                detail: "requires ids and weight".into(),
            });
        }
        let weight = inputs[1].shape;
        if weight.rank() != 2 {
            return Err(OpError::InvalidArgument {
                op: "Embedding",
                detail: format!("weight must be [V, E], got {weight}"),
            });
        }
        let mut dims = inputs[0].shape.dims().to_vec();
        dims.push(weight.dims()[1]);
        Ok(vec![ValueInfo::new(Shape::new(dims), DType::F32)])
    }

    fn execute(
        &self,
        inputs: &[&Tensor],
        outputs: &mut [Tensor],
        _ctx: &ExecutionContext,
    ) -> Result<(), OpError> {
        self.validate(inputs)?;
        expect_single_output("Embedding", outputs)?;
        let infos = self.infer_shapes(&[
            InferenceInput::new(inputs[0].shape(), inputs[0].dtype()),
            InferenceInput::new(inputs[1].shape(), inputs[1].dtype()),
        ])?;
        expect_output_shape("Embedding", &outputs[0], &infos[0].shape)?;

        let vocab = inputs[1].shape().dims()[0];
        let embed = inputs[1].shape().dims()[1] as usize;
        let ids = inputs[0].as_i64().to_vec();
        let weight = inputs[1].as_f32();
        let out = outputs[0].as_f32_mut()?;

        for (pos, &id) in ids.iter().enumerate() {
            if id < 0 || id >= vocab {
                return Err(OpError::InvalidArgument {
                    op: "Embedding",
                    detail: format!("token id {id} out of range for vocabulary {vocab}"),
                });
            }
            let row = &weight[id as usize * embed..(id as usize + 1) * embed];
            out[pos * embed..(pos + 1) * embed].copy_from_slice(row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_manager::DeviceKind;

    #[test]
    fn test_lookup() {
        let ids = Tensor::from_i64(Shape::matrix(1, 3), &[2, 0, 1]).unwrap();
        let weight = Tensor::from_f32(
            Shape::matrix(3, 2),
            &[0.0, 0.1, 1.0, 1.1, 2.0, 2.1],
        )
        .unwrap();
        let op = Embedding;
        let infos = op
            .infer_shapes(&[
                InferenceInput::new(ids.shape(), DType::I64),
                InferenceInput::new(weight.shape(), DType::F32),
            ])
            .unwrap();
        assert_eq!(infos[0].shape.dims(), &[1, 3, 2]);

        let mut outputs = vec![Tensor::new(
            infos[0].shape.clone(),
            DType::F32,
            DeviceKind::Cpu,
        )
        .unwrap()];
        op.execute(&[&ids, &weight], &mut outputs, &ExecutionContext::default())
            .unwrap();
        assert_eq!(outputs[0].as_f32(), &[2.0, 2.1, 0.0, 0.1, 1.0, 1.1]);
    }

    #[test]
    fn test_out_of_vocab_rejected() {
        let ids = Tensor::from_i64(Shape::vector(1), &[5]).unwrap();
        let weight = Tensor::from_f32(Shape::matrix(3, 2), &[0.0; 6]).unwrap();
        let mut outputs =
            vec![Tensor::new(Shape::new(vec![1, 2]), DType::F32, DeviceKind::Cpu).unwrap()];
        let result = Embedding.execute(
            &[&ids, &weight],
            &mut outputs,
            &ExecutionContext::default(),
        );
        assert!(matches!(result, Err(OpError::InvalidArgument { .. })));
    }

    #[test]
    fn test_dtype_checks() {
        let bad_ids = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        let weight = Tensor::from_f32(Shape::matrix(3, 2), &[0.0; 6]).unwrap();
        assert!(Embedding.validate(&[&bad_ids, &weight]).is_err());
    }
}
