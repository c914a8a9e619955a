// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory-layout assignment and transpose insertion.
//!
//! Image-shaped operators prefer NCHW; layout-oblivious operators
//! inherit the layout of their first input. Where a consumer's assigned
//! layout differs from the producer's, a `Transpose` node is inserted —
//! with its `perm` attribute computed at insertion time, never left
//! unset.

use crate::{OptimizerError, Pass};
use graph_ir::{Attribute, Graph, ValueId};
use std::collections::HashMap;
use tensor_core::TensorLayout;

pub struct MemoryLayoutOptimization;

impl Pass for MemoryLayoutOptimization {
    fn name(&self) -> &'static str {
        "MemoryLayoutOptimization"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["OperatorFusion"]
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        let order = graph.topological_sort();

        // Per-value layout bookkeeping, seeded from the values
        // themselves (graph inputs may arrive tagged NHWC).
        let mut value_layouts: HashMap<ValueId, TensorLayout> = graph
            .iter_values()
            .map(|v| (v.id(), v.layout))
            .collect();

        // First sweep: assign each node a layout and propagate to its
        // outputs.
        let mut node_layouts = HashMap::new();
        for &node_id in &order {
            let node = graph.node(node_id);
            let layout = match node.op_type.as_str() {
                "Conv" | "MaxPool" | "AveragePool" | "BatchNormalization"
                | "FusedConvBNReLU" => TensorLayout::Nchw,
                _ => node
                    .inputs()
                    .first()
                    .and_then(|id| value_layouts.get(id).copied())
                    .unwrap_or_default(),
            };
            node_layouts.insert(node_id, layout);
            for &output in node.outputs() {
                value_layouts.insert(output, layout);
            }
        }

        // Second sweep: where an input's layout disagrees with the
        // node's, plan a transpose.
        let mut insertions = Vec::new();
        for &node_id in &order {
            let node_layout = node_layouts[&node_id];
            for &input in graph.node(node_id).inputs() {
                let input_layout = value_layouts
                    .get(&input)
                    .copied()
                    .unwrap_or_default();
                if input_layout != node_layout {
                    if let Some(perm) = input_layout.perm_to(node_layout) {
                        insertions.push((node_id, input, perm, node_layout));
                    } else {
                        tracing::warn!(
                            "no transpose permutation from {input_layout} to {node_layout} for value {}",
                            input.index()
                        );
                    }
                }
            }
        }

        let changed = !insertions.is_empty();
        for (index, (consumer, input, perm, target)) in insertions.into_iter().enumerate() {
            let intermediate = graph.add_value();
            let transpose = graph.add_node("Transpose", Some(format!("layout_transpose_{index}")));
            graph.set_attr(transpose, "perm", Attribute::I64s(perm));
            graph.connect_input(transpose, input);
            graph.connect_output(transpose, intermediate);
            graph.replace_input(consumer, input, intermediate);
            graph.value_mut(intermediate).layout = target;
            tracing::debug!(
                "inserted layout transpose before node {}",
                consumer.index()
            );
        }

        // Persist the layout map onto the values.
        for (id, layout) in value_layouts {
            if graph.get_value(id).is_some() {
                graph.value_mut(id).layout = layout;
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape, Tensor};

    fn conv_graph_with_input_layout(layout: TensorLayout) -> Graph {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::new(vec![1, 3, 4, 4]));
        g.value_mut(x).dtype = DType::F32;
        g.value_mut(x).layout = layout;
        let w = g.add_initializer(
            "w",
            Tensor::from_f32(Shape::new(vec![2, 3, 1, 1]), &[0.5; 6]).unwrap(),
        );
        let y = g.add_named_value("y");
        let conv = g.add_node("Conv", None);
        g.connect_input(conv, x);
        g.connect_input(conv, w);
        g.connect_output(conv, y);
        g.add_input(x);
        g.add_output(y);
        g
    }

    #[test]
    fn test_matching_layouts_insert_nothing() {
        let mut g = conv_graph_with_input_layout(TensorLayout::Nchw);
        let changed = MemoryLayoutOptimization.run(&mut g).unwrap();
        assert!(!changed);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_nhwc_input_gets_transpose() {
        let mut g = conv_graph_with_input_layout(TensorLayout::Nhwc);
        let changed = MemoryLayoutOptimization.run(&mut g).unwrap();
        assert!(changed);
        assert_eq!(g.node_count(), 2);

        let transpose = g
            .iter_nodes()
            .find(|n| n.op_type == "Transpose")
            .expect("transpose inserted");
        // The perm attribute is set to the NHWC → NCHW permutation.
        assert_eq!(transpose.attrs.get_i64s("perm"), Some(&[0, 3, 1, 2][..]));

        // The conv now reads the transposed intermediate.
        let conv = g.iter_nodes().find(|n| n.op_type == "Conv").unwrap();
        assert_eq!(conv.inputs()[0], transpose.outputs()[0]);
        g.validate().unwrap();
    }

    #[test]
    fn test_layout_bookkeeping_written_to_values() {
        let mut g = conv_graph_with_input_layout(TensorLayout::Nchw);
        MemoryLayoutOptimization.run(&mut g).unwrap();
        let y = g.find_value_by_name("y").unwrap();
        assert_eq!(g.value(y).layout, TensorLayout::Nchw);
    }
}
