// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-graph shape inference.
//!
//! Walks the graph topologically and asks each node's kernel for its
//! output shapes, binding the results onto the output values. A node
//! whose rule cannot run (unknown op, missing input metadata, rule
//! failure) is a **warning**, not an error — the planner defers the
//! affected values and a consumer that truly needs the shape fails at
//! execution with a caller-visible error.

use crate::op::InferenceInput;
use crate::registry;
use graph_ir::Graph;
use tensor_core::DType;

/// Statistics from one inference sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReport {
    /// Nodes whose outputs were annotated.
    pub inferred: usize,
    /// Nodes skipped with a warning.
    pub skipped: usize,
}

/// Runs shape/dtype inference over every node in topological order.
pub fn infer_graph(graph: &mut Graph) -> InferenceReport {
    let order = graph.topological_sort();
    let mut report = InferenceReport::default();

    for node_id in order {
        let node = graph.node(node_id);
        let op_type = node.op_type.clone();
        let input_ids = node.inputs().to_vec();
        let output_ids = node.outputs().to_vec();

        let kernel = match registry().create(&op_type, &node.attrs) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(
                    "shape inference skipping node {} ({op_type}): {e}",
                    node_id.index()
                );
                report.skipped += 1;
                continue;
            }
        };

        // Collect per-input metadata; initializer tensors ride along so
        // data-dependent rules (Reshape, Slice) can resolve.
        let mut missing = false;
        let values: Vec<_> = input_ids
            .iter()
            .map(|&id| graph.value(id))
            .collect();
        let mut inputs = Vec::with_capacity(values.len());
        for value in &values {
            let Some(shape) = value.effective_shape() else {
                missing = true;
                break;
            };
            let dtype = value.effective_dtype();
            match value.tensor.as_ref().filter(|_| value.is_initializer()) {
                Some(tensor) => {
                    inputs.push(InferenceInput::with_tensor(shape, dtype, tensor))
                }
                None => inputs.push(InferenceInput::new(shape, dtype)),
            }
        }
        if missing {
            tracing::warn!(
                "shape inference skipping node {} ({op_type}): input metadata unavailable",
                node_id.index()
            );
            report.skipped += 1;
            continue;
        }

        match kernel.infer_shapes(&inputs) {
            Ok(infos) => {
                for (output_id, info) in output_ids.iter().zip(infos) {
                    let value = graph.value_mut(*output_id);
                    value.shape = Some(info.shape);
                    if info.dtype != DType::Unknown {
                        value.dtype = info.dtype;
                    }
                }
                report.inferred += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "shape inference failed for node {} ({op_type}): {e}",
                    node_id.index()
                );
                report.skipped += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::Attribute;
    use tensor_core::{Shape, Tensor};

    #[test]
    fn test_infer_matmul_chain() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::matrix(2, 3));
        g.value_mut(x).dtype = DType::F32;
        let w = g.add_initializer(
            "w",
            Tensor::from_f32(Shape::matrix(3, 4), &[0.5; 12]).unwrap(),
        );
        let h = g.add_value();
        let y = g.add_named_value("y");

        let mm = g.add_node("MatMul", None);
        g.connect_input(mm, x);
        g.connect_input(mm, w);
        g.connect_output(mm, h);

        let relu = g.add_node("Relu", None);
        g.connect_input(relu, h);
        g.connect_output(relu, y);

        g.add_input(x);
        g.add_output(y);

        let report = infer_graph(&mut g);
        assert_eq!(report.inferred, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(g.value(h).shape.as_ref().unwrap().dims(), &[2, 4]);
        assert_eq!(g.value(y).shape.as_ref().unwrap().dims(), &[2, 4]);
        assert_eq!(g.value(y).dtype, DType::F32);
    }

    #[test]
    fn test_infer_reshape_from_initializer() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::new(vec![2, 3, 4]));
        g.value_mut(x).dtype = DType::F32;
        let target = g.add_initializer(
            "target",
            Tensor::from_i64(Shape::vector(2), &[6, 4]).unwrap(),
        );
        let y = g.add_named_value("y");

        let reshape = g.add_node("Reshape", None);
        g.connect_input(reshape, x);
        g.connect_input(reshape, target);
        g.connect_output(reshape, y);
        g.add_input(x);
        g.add_output(y);

        infer_graph(&mut g);
        assert_eq!(g.value(y).shape.as_ref().unwrap().dims(), &[6, 4]);
    }

    #[test]
    fn test_unknown_op_is_warning_not_error() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(4));
        g.value_mut(x).dtype = DType::F32;
        let y = g.add_named_value("y");
        let node = g.add_node("ExoticCustomOp", None);
        g.connect_input(node, x);
        g.connect_output(node, y);
        g.add_input(x);
        g.add_output(y);

        let report = infer_graph(&mut g);
        assert_eq!(report.skipped, 1);
        // The output stays unannotated; nothing blew up.
        assert!(g.value(y).shape.is_none());
    }

    #[test]
    fn test_dynamic_dim_propagates() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        let mut shape = Shape::new(vec![-1, 8]);
        shape.mark_dynamic(0);
        g.value_mut(x).shape = Some(shape);
        g.value_mut(x).dtype = DType::F32;
        let y = g.add_named_value("y");
        let relu = g.add_node("Relu", None);
        g.connect_input(relu, x);
        g.connect_output(relu, y);
        g.add_input(x);
        g.add_output(y);

        infer_graph(&mut g);
        let y_shape = g.value(y).shape.as_ref().unwrap();
        assert!(y_shape.is_dim_dynamic(0));
        assert_eq!(y_shape.dim(1), Some(8));
    }

    #[test]
    fn test_softmax_axis_attr_respected() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::matrix(4, 6));
        g.value_mut(x).dtype = DType::F32;
        let y = g.add_named_value("y");
        let sm = g.add_node("Softmax", None);
        g.set_attr(sm, "axis", Attribute::I64(0));
        g.connect_input(sm, x);
        g.connect_output(sm, y);
        g.add_input(x);
        g.add_output(y);

        let report = infer_graph(&mut g);
        assert_eq!(report.inferred, 1);
        assert_eq!(g.value(y).shape.as_ref().unwrap().dims(), &[4, 6]);
    }
}
