// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Identity subgraph simplification.
//!
//! `Add(0, x) → x` and `Mul(1, x) → x`: when one operand is a constant
//! zero (for Add) or one (for Mul), consumers are rerouted to the other
//! operand and the node disappears. Graph outputs that referenced the
//! removed result are rewritten to the survivor.

use crate::{OptimizerError, Pass};
use graph_ir::{Graph, NodeId, ValueId};
use tensor_core::{DType, Tensor};

/// Internal rescan ceiling per run.
const MAX_ROUNDS: usize = 5;

/// Tolerance when testing a constant against 0 or 1.
const CONST_TOLERANCE: f32 = 1e-6;

pub struct SubgraphReplacement;

impl Pass for SubgraphReplacement {
    fn name(&self) -> &'static str {
        "SubgraphReplacement"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ConstantFolding"]
    }

    fn repeatable(&self) -> bool {
        true
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        let mut changed = false;
        for _ in 0..MAX_ROUNDS {
            match find_identity(graph) {
                Some((node, survivor)) => {
                    eliminate(graph, node, survivor);
                    changed = true;
                }
                None => break,
            }
        }
        Ok(changed)
    }
}

/// Finds the first removable identity node and its surviving operand.
fn find_identity(graph: &Graph) -> Option<(NodeId, ValueId)> {
    for node_id in graph.topological_sort() {
        let node = graph.node(node_id);
        let neutral = match node.op_type.as_str() {
            "Add" => 0.0,
            "Mul" => 1.0,
            _ => continue,
        };
        let inputs = node.inputs();
        if inputs.len() != 2 || node.outputs().is_empty() {
            continue;
        }

        let is_neutral = |id: ValueId| {
            graph
                .value(id)
                .tensor
                .as_ref()
                .filter(|_| graph.value(id).is_initializer())
                .map(|t| is_constant(t, neutral))
                .unwrap_or(false)
        };

        if is_neutral(inputs[0]) {
            return Some((node_id, inputs[1]));
        }
        if is_neutral(inputs[1]) {
            return Some((node_id, inputs[0]));
        }
    }
    None
}

/// Reroutes consumers and graph outputs from the node's result to
/// `survivor`, then removes the node.
fn eliminate(graph: &mut Graph, node: NodeId, survivor: ValueId) {
    let output = graph.node(node).outputs()[0];
    let consumers = graph.value(output).consumers().to_vec();
    for consumer in consumers {
        graph.replace_input(consumer, output, survivor);
    }
    graph.replace_graph_output(output, survivor);
    tracing::debug!(
        "replaced identity {} node {} with value {}",
        graph.node(node).op_type,
        node.index(),
        survivor.index()
    );
    graph.remove_node(node);
}

fn is_constant(tensor: &Tensor, expected: f32) -> bool {
    if tensor.dtype() != DType::F32 {
        return false;
    }
    tensor
        .as_f32()
        .iter()
        .all(|&v| (v - expected).abs() <= CONST_TOLERANCE)
}
