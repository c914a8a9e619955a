// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator fusion.
//!
//! Pattern catalogue:
//! - `Conv → BatchNormalization → Relu`  ⇒ `FusedConvBNReLU`
//! - `Conv → Relu`                       ⇒ `FusedConvBNReLU` with
//!   identity BatchNorm parameters (scale 1, shift 0, mean 0, var 1)
//! - `BatchNormalization → Relu`         ⇒ `BatchNormalization` with
//!   `fused_relu = 1`
//! - `MatMul → Add`                      ⇒ `FusedMatMulAdd`
//!
//! Every pattern requires the bridging value to have the second node as
//! its sole consumer and to not be a graph output. The fused node takes
//! over the tail node's output value, so output identity is preserved.
//! Bridging values linger unreferenced in the arena; `validate` accepts
//! them and nothing allocates for them.

use crate::{OptimizerError, Pass};
use graph_ir::{Attribute, Graph, NodeId, ValueId};
use tensor_core::{Shape, Tensor};

/// Internal rescan ceiling per run; the pass is also repeatable, so the
/// manager re-invokes it until quiescent.
const MAX_ROUNDS: usize = 10;

pub struct OperatorFusion;

impl Pass for OperatorFusion {
    fn name(&self) -> &'static str {
        "OperatorFusion"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["DeadCodeElimination"]
    }

    fn repeatable(&self) -> bool {
        true
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        let mut changed = false;
        for _ in 0..MAX_ROUNDS {
            if !self.fuse_one(graph)? {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }
}

impl OperatorFusion {
    /// Applies the first matching pattern in topological order. One
    /// rewrite per scan keeps the traversal state trivially valid.
    fn fuse_one(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        for node_id in graph.topological_sort() {
            let op_type = graph.node(node_id).op_type.clone();
            match op_type.as_str() {
                "Conv" => {
                    if let Some((bridge, bn)) = sole_consumer(graph, node_id, "BatchNormalization")
                    {
                        if let Some((bn_bridge, relu)) = sole_consumer(graph, bn, "Relu") {
                            fuse_conv_bn_relu(graph, node_id, bn, relu, bridge, bn_bridge)?;
                            return Ok(true);
                        }
                    }
                    if let Some((bridge, relu)) = sole_consumer(graph, node_id, "Relu") {
                        if fuse_conv_relu(graph, node_id, relu, bridge)? {
                            return Ok(true);
                        }
                    }
                }
                "BatchNormalization" => {
                    // Skip nodes that already absorbed a Relu.
                    if graph.node(node_id).attrs.get_i64("fused_relu").unwrap_or(0) != 0 {
                        continue;
                    }
                    if let Some((bridge, relu)) = sole_consumer(graph, node_id, "Relu") {
                        fuse_bn_relu(graph, node_id, relu, bridge)?;
                        return Ok(true);
                    }
                }
                "MatMul" => {
                    if let Some((bridge, add)) = sole_consumer(graph, node_id, "Add") {
                        fuse_matmul_add(graph, node_id, add, bridge)?;
                        return Ok(true);
                    }
                }
                _ => {}
            }
        }
        Ok(false)
    }
}

/// If `node`'s first output bridges to exactly one consumer of the
/// given op type — and is not itself a graph output — returns the
/// bridging value and the consumer.
fn sole_consumer(graph: &Graph, node: NodeId, op_type: &str) -> Option<(ValueId, NodeId)> {
    let outputs = graph.node(node).outputs();
    let bridge = *outputs.first()?;
    if graph.outputs().contains(&bridge) {
        return None;
    }
    let value = graph.value(bridge);
    match value.consumers() {
        [only] => {
            let consumer = *only;
            (graph.node(consumer).op_type == op_type).then_some((bridge, consumer))
        }
        _ => None,
    }
}

/// Output-channel count from the Conv weight value, when known.
fn conv_out_channels(graph: &Graph, conv: NodeId) -> Option<i64> {
    let weight = *graph.node(conv).inputs().get(1)?;
    let shape = graph.value(weight).effective_shape()?;
    shape.dims().first().copied().filter(|&c| c > 0)
}

/// Adds a constant-filled `[len]` initializer.
fn const_vector(graph: &mut Graph, name: String, len: i64, fill: f32) -> Result<ValueId, OptimizerError> {
    let tensor = Tensor::from_f32(Shape::vector(len), &vec![fill; len as usize])?;
    Ok(graph.add_initializer(name, tensor))
}

fn fused_name(graph: &Graph, parts: &[NodeId]) -> String {
    let mut name = parts
        .iter()
        .map(|&id| graph.node(id).display_name().to_string())
        .collect::<Vec<_>>()
        .join("_");
    name.push_str("_fused");
    name
}

/// `Conv → BN → Relu` ⇒ `FusedConvBNReLU`.
fn fuse_conv_bn_relu(
    graph: &mut Graph,
    conv: NodeId,
    bn: NodeId,
    relu: NodeId,
    _conv_bridge: ValueId,
    _bn_bridge: ValueId,
) -> Result<(), OptimizerError> {
    let Some(out_c) = conv_out_channels(graph, conv) else {
        return Ok(());
    };
    let conv_inputs = graph.node(conv).inputs().to_vec();
    let bn_inputs = graph.node(bn).inputs().to_vec();
    if bn_inputs.len() < 5 || graph.node(relu).outputs().is_empty() {
        return Ok(());
    }
    let relu_out = graph.node(relu).outputs()[0];
    let name = fused_name(graph, &[conv, bn, relu]);

    let fused = graph.add_node("FusedConvBNReLU", Some(name));
    copy_attrs(graph, conv, fused);
    if let Some(eps) = graph.node(bn).attrs.get_f32("epsilon") {
        graph.set_attr(fused, "epsilon", Attribute::F32(eps));
    }

    // Inputs: x, weight, conv_bias (synthesised when absent), then the
    // four BN parameters.
    graph.connect_input(fused, conv_inputs[0]);
    graph.connect_input(fused, conv_inputs[1]);
    let bias = match conv_inputs.get(2) {
        Some(&b) => b,
        None => const_vector(
            graph,
            format!("{}_zero_bias", fused.index()),
            out_c,
            0.0,
        )?,
    };
    graph.connect_input(fused, bias);
    for &param in &bn_inputs[1..5] {
        graph.connect_input(fused, param);
    }

    graph.remove_node(relu);
    graph.remove_node(bn);
    graph.remove_node(conv);
    graph.connect_output(fused, relu_out);
    tracing::debug!("fused Conv+BN+Relu into node {}", fused.index());
    Ok(())
}

/// `Conv → Relu` ⇒ `FusedConvBNReLU` with identity BN parameters.
/// Returns `false` (no rewrite) when the weight shape is unknown.
fn fuse_conv_relu(
    graph: &mut Graph,
    conv: NodeId,
    relu: NodeId,
    _bridge: ValueId,
) -> Result<bool, OptimizerError> {
    let Some(out_c) = conv_out_channels(graph, conv) else {
        return Ok(false);
    };
    if graph.node(relu).outputs().is_empty() {
        return Ok(false);
    }
    let conv_inputs = graph.node(conv).inputs().to_vec();
    let relu_out = graph.node(relu).outputs()[0];
    let name = fused_name(graph, &[conv, relu]);

    let fused = graph.add_node("FusedConvBNReLU", Some(name));
    copy_attrs(graph, conv, fused);

    graph.connect_input(fused, conv_inputs[0]);
    graph.connect_input(fused, conv_inputs[1]);
    let bias = match conv_inputs.get(2) {
        Some(&b) => b,
        None => const_vector(graph, format!("{}_zero_bias", fused.index()), out_c, 0.0)?,
    };
    graph.connect_input(fused, bias);

    // Identity BatchNorm: scale 1, shift 0, mean 0, var 1.
    let prefix = fused.index();
    let scale = const_vector(graph, format!("{prefix}_bn_scale"), out_c, 1.0)?;
    let shift = const_vector(graph, format!("{prefix}_bn_shift"), out_c, 0.0)?;
    let mean = const_vector(graph, format!("{prefix}_bn_mean"), out_c, 0.0)?;
    let var = const_vector(graph, format!("{prefix}_bn_var"), out_c, 1.0)?;
    for param in [scale, shift, mean, var] {
        graph.connect_input(fused, param);
    }

    graph.remove_node(relu);
    graph.remove_node(conv);
    graph.connect_output(fused, relu_out);
    tracing::debug!("fused Conv+Relu into node {}", fused.index());
    Ok(true)
}

/// `BN → Relu` ⇒ `BatchNormalization` with `fused_relu = 1`.
fn fuse_bn_relu(
    graph: &mut Graph,
    bn: NodeId,
    relu: NodeId,
    _bridge: ValueId,
) -> Result<(), OptimizerError> {
    let bn_inputs = graph.node(bn).inputs().to_vec();
    if graph.node(relu).outputs().is_empty() {
        return Ok(());
    }
    let relu_out = graph.node(relu).outputs()[0];
    let name = fused_name(graph, &[bn, relu]);

    let fused = graph.add_node("BatchNormalization", Some(name));
    copy_attrs(graph, bn, fused);
    graph.set_attr(fused, "fused_relu", Attribute::I64(1));
    for input in bn_inputs {
        graph.connect_input(fused, input);
    }

    graph.remove_node(relu);
    graph.remove_node(bn);
    graph.connect_output(fused, relu_out);
    tracing::debug!("fused BN+Relu into node {}", fused.index());
    Ok(())
}

/// `MatMul → Add` ⇒ `FusedMatMulAdd`.
fn fuse_matmul_add(
    graph: &mut Graph,
    matmul: NodeId,
    add: NodeId,
    bridge: ValueId,
) -> Result<(), OptimizerError> {
    let matmul_inputs = graph.node(matmul).inputs().to_vec();
    let add_inputs = graph.node(add).inputs().to_vec();
    if matmul_inputs.len() < 2 || graph.node(add).outputs().is_empty() {
        return Ok(());
    }
    let add_out = graph.node(add).outputs()[0];

    // The Add operand that is not the MatMul result is the bias.
    let Some(&bias) = add_inputs.iter().find(|&&v| v != bridge) else {
        return Ok(());
    };
    let name = fused_name(graph, &[matmul, add]);

    let fused = graph.add_node("FusedMatMulAdd", Some(name));
    copy_attrs(graph, matmul, fused);
    graph.connect_input(fused, matmul_inputs[0]);
    graph.connect_input(fused, matmul_inputs[1]);
    graph.connect_input(fused, bias);

    graph.remove_node(add);
    graph.remove_node(matmul);
    graph.connect_output(fused, add_out);
    tracing::debug!("fused MatMul+Add into node {}", fused.index());
    Ok(())
}

fn copy_attrs(graph: &mut Graph, from: NodeId, to: NodeId) {
    let attrs: Vec<(String, Attribute)> = graph
        .node(from)
        .attrs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (name, attr) in attrs {
        graph.set_attr(to, name, attr);
    }
}
