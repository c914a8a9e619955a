// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Constant folding.
//!
//! A node whose inputs are all initializers is executed at optimisation
//! time; its outputs become initializers themselves and the node is
//! removed. One topological sweep folds whole constant chains, because
//! each folded output joins the constant set immediately.

use crate::{OptimizerError, Pass};
use graph_ir::Graph;
use memory_manager::DeviceKind;
use operators::{registry, ExecutionContext, InferenceInput};
use tensor_core::Tensor;

pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        let order = graph.topological_sort();
        let mut changed = false;

        for node_id in order {
            let node = graph.node(node_id);
            let input_ids = node.inputs().to_vec();
            let output_ids = node.outputs().to_vec();
            if input_ids.is_empty() || output_ids.is_empty() {
                continue;
            }
            let op_type = node.op_type.clone();

            // Every input must be an initializer (bound tensor, no
            // producer).
            if !input_ids
                .iter()
                .all(|&id| graph.value(id).is_initializer())
            {
                continue;
            }
            // A graph-input value is caller-bound, not a constant.
            if input_ids.iter().any(|id| graph.inputs().contains(id)) {
                continue;
            }

            let Ok(kernel) = registry().create(&op_type, &graph.node(node_id).attrs) else {
                continue;
            };

            let input_tensors: Vec<Tensor> = input_ids
                .iter()
                .map(|&id| graph.value(id).tensor.clone().expect("initializer tensor"))
                .collect();
            let input_refs: Vec<&Tensor> = input_tensors.iter().collect();

            let infer_inputs: Vec<InferenceInput<'_>> = input_tensors
                .iter()
                .map(|t| InferenceInput::with_tensor(t.shape(), t.dtype(), t))
                .collect();
            let Ok(infos) = kernel.infer_shapes(&infer_inputs) else {
                continue;
            };
            // Multi-output ops fold only when every output resolves.
            if infos.len() < output_ids.len() || infos.iter().any(|i| i.shape.is_dynamic()) {
                continue;
            }

            let mut outputs: Vec<Tensor> = Vec::with_capacity(infos.len());
            let mut alloc_failed = false;
            for info in &infos {
                match Tensor::new(info.shape.clone(), info.dtype, DeviceKind::Cpu) {
                    Ok(t) => outputs.push(t),
                    Err(_) => {
                        alloc_failed = true;
                        break;
                    }
                }
            }
            if alloc_failed {
                continue;
            }

            if kernel
                .execute(&input_refs, &mut outputs, &ExecutionContext::default())
                .is_err()
            {
                continue;
            }

            tracing::debug!("folded node {} ({op_type})", node_id.index());
            graph.remove_node(node_id);
            for (output_id, tensor) in output_ids.iter().zip(outputs) {
                let value = graph.value_mut(*output_id);
                value.shape = Some(tensor.shape().clone());
                value.dtype = tensor.dtype();
                value.tensor = Some(tensor);
            }
            changed = true;
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    fn constant_add_graph() -> Graph {
        let mut g = Graph::new();
        // A dummy runtime input so the graph validates; the Add chain
        // itself is fully constant.
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(3));
        let pass_through = g.add_named_value("x_out");
        let relu = g.add_node("Relu", None);
        g.connect_input(relu, x);
        g.connect_output(relu, pass_through);

        let a = g.add_initializer(
            "a",
            Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap(),
        );
        let b = g.add_initializer(
            "b",
            Tensor::from_f32(Shape::vector(3), &[10.0, 20.0, 30.0]).unwrap(),
        );
        let sum = g.add_named_value("sum");
        let add = g.add_node("Add", None);
        g.connect_input(add, a);
        g.connect_input(add, b);
        g.connect_output(add, sum);

        g.add_input(x);
        g.add_output(pass_through);
        g.add_output(sum);
        g
    }

    #[test]
    fn test_folds_constant_add() {
        operators::init_operators();
        let mut g = constant_add_graph();
        let changed = ConstantFolding.run(&mut g).unwrap();
        assert!(changed);

        // The Add node is gone; its output is now an initializer.
        assert_eq!(g.node_count(), 1);
        let sum = g.find_value_by_name("sum").unwrap();
        let value = g.value(sum);
        assert!(value.is_initializer());
        assert_eq!(
            value.tensor.as_ref().unwrap().as_f32(),
            &[11.0, 22.0, 33.0]
        );
        g.validate().unwrap();
    }

    #[test]
    fn test_folds_constant_chain_in_one_sweep() {
        operators::init_operators();
        let mut g = constant_add_graph();
        // Chain a Relu onto the folded sum.
        let sum = g.find_value_by_name("sum").unwrap();
        let act = g.add_named_value("act");
        let relu = g.add_node("Relu", None);
        g.connect_input(relu, sum);
        g.connect_output(relu, act);
        g.replace_graph_output(sum, act);

        let changed = ConstantFolding.run(&mut g).unwrap();
        assert!(changed);
        let act = g.find_value_by_name("act").unwrap();
        assert!(g.value(act).is_initializer());
        assert_eq!(
            g.value(act).tensor.as_ref().unwrap().as_f32(),
            &[11.0, 22.0, 33.0]
        );
    }

    #[test]
    fn test_idempotent() {
        operators::init_operators();
        let mut g = constant_add_graph();
        assert!(ConstantFolding.run(&mut g).unwrap());
        assert!(!ConstantFolding.run(&mut g).unwrap());
    }

    #[test]
    fn test_runtime_inputs_not_folded() {
        operators::init_operators();
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(2));
        let w = g.add_initializer(
            "w",
            Tensor::from_f32(Shape::vector(2), &[1.0, 1.0]).unwrap(),
        );
        let y = g.add_named_value("y");
        let add = g.add_node("Add", None);
        g.connect_input(add, x);
        g.connect_input(add, w);
        g.connect_output(add, y);
        g.add_input(x);
        g.add_output(y);

        assert!(!ConstantFolding.run(&mut g).unwrap());
        assert_eq!(g.node_count(), 1);
    }
}
