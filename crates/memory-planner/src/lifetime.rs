// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Value lifetime intervals over a fixed execution order.

use graph_ir::{Graph, NodeId, ValueId};
use std::collections::HashMap;

/// The live interval of one value, in execution-order indices.
///
/// Graph inputs are born at `-1` (before the first node); graph outputs
/// die at `n` (after the last node). Two intervals interlock — their
/// buffers cannot be shared — when they overlap at any index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    pub value: ValueId,
    pub birth: i64,
    pub death: i64,
    /// Byte size of the value's tensor, 0 when the shape is deferred.
    pub bytes: usize,
}

impl Lifetime {
    /// `true` when the two intervals overlap at any index.
    pub fn interlocks(&self, other: &Lifetime) -> bool {
        !(self.death <= other.birth || other.death <= self.birth)
    }
}

/// Computes lifetime intervals for every non-initializer value reachable
/// from `order`.
///
/// Initializers are immortal and excluded — the planner never reassigns
/// their storage. Values whose shape is still unknown get `bytes == 0`;
/// the planner defers them to execution-time allocation.
pub fn analyze_lifetimes(graph: &Graph, order: &[NodeId]) -> Vec<Lifetime> {
    let n = order.len() as i64;
    let position: HashMap<NodeId, i64> = order
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i as i64))
        .collect();

    let mut lifetimes: HashMap<ValueId, Lifetime> = HashMap::new();

    // Births: a value is born when its producer runs; graph inputs are
    // born before everything.
    for &input in graph.inputs() {
        lifetimes.insert(
            input,
            Lifetime {
                value: input,
                birth: -1,
                death: -1,
                bytes: value_bytes(graph, input),
            },
        );
    }
    for &node_id in order {
        let pos = position[&node_id];
        for &output in graph.node(node_id).outputs() {
            lifetimes.entry(output).or_insert(Lifetime {
                value: output,
                birth: pos,
                death: pos,
                bytes: value_bytes(graph, output),
            });
        }
    }

    // Deaths: the last consuming position.
    for &node_id in order {
        let pos = position[&node_id];
        for &input in graph.node(node_id).inputs() {
            if let Some(lifetime) = lifetimes.get_mut(&input) {
                lifetime.death = lifetime.death.max(pos);
            }
        }
    }

    // Graph outputs survive the whole run.
    for &output in graph.outputs() {
        if let Some(lifetime) = lifetimes.get_mut(&output) {
            lifetime.death = n;
        }
    }

    // Initializers are immortal; drop them from the plannable set.
    let mut result: Vec<Lifetime> = lifetimes
        .into_values()
        .filter(|l| !graph.value(l.value).is_initializer())
        .collect();
    result.sort_by_key(|l| (l.birth, l.value));
    result
}

fn value_bytes(graph: &Graph, id: ValueId) -> usize {
    let value = graph.value(id);
    match value.effective_shape() {
        Some(shape) if !shape.is_dynamic() => shape.size_bytes(value.effective_dtype()),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    /// x -> Relu -> a -> Relu -> b -> Relu -> y
    fn chain() -> (Graph, Vec<NodeId>) {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        let a = g.add_value();
        let b = g.add_value();
        let y = g.add_named_value("y");
        for v in [x, a, b, y] {
            g.value_mut(v).shape = Some(Shape::vector(16));
            g.value_mut(v).dtype = DType::F32;
        }
        let n0 = g.add_node("Relu", None);
        let n1 = g.add_node("Relu", None);
        let n2 = g.add_node("Relu", None);
        g.connect_input(n0, x);
        g.connect_output(n0, a);
        g.connect_input(n1, a);
        g.connect_output(n1, b);
        g.connect_input(n2, b);
        g.connect_output(n2, y);
        g.add_input(x);
        g.add_output(y);
        let order = g.topological_sort();
        (g, order)
    }

    #[test]
    fn test_chain_lifetimes() {
        let (g, order) = chain();
        let lifetimes = analyze_lifetimes(&g, &order);

        let find = |id| lifetimes.iter().find(|l| l.value == id).copied().unwrap();
        let x = g.find_value_by_name("x").unwrap();
        let y = g.find_value_by_name("y").unwrap();

        let lx = find(x);
        assert_eq!(lx.birth, -1);
        assert_eq!(lx.death, 0);

        let ly = find(y);
        assert_eq!(ly.birth, 2);
        assert_eq!(ly.death, 3); // graph output: dies at n.

        // Intermediate a: born at 0, last used at 1.
        let a = lifetimes
            .iter()
            .find(|l| l.birth == 0 && l.value != x)
            .unwrap();
        assert_eq!(a.death, 1);
    }

    #[test]
    fn test_interlock() {
        let a = Lifetime {
            value: ValueId::from_index(0),
            birth: 0,
            death: 2,
            bytes: 4,
        };
        let b = Lifetime {
            value: ValueId::from_index(1),
            birth: 2,
            death: 3,
            bytes: 4,
        };
        let c = Lifetime {
            value: ValueId::from_index(2),
            birth: 1,
            death: 2,
            bytes: 4,
        };
        // a dies exactly when b is born: no overlap, reuse is legal.
        assert!(!a.interlocks(&b));
        // a and c overlap on (1, 2).
        assert!(a.interlocks(&c));
    }

    #[test]
    fn test_initializers_excluded() {
        let (mut g, _) = chain();
        let w = g.add_initializer(
            "w",
            tensor_core::Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap(),
        );
        let order = g.topological_sort();
        let lifetimes = analyze_lifetimes(&g, &order);
        assert!(lifetimes.iter().all(|l| l.value != w));
    }

    #[test]
    fn test_unknown_shape_has_zero_bytes() {
        let (mut g, order) = chain();
        let a = g
            .iter_values()
            .find(|v| v.name.is_none())
            .map(|v| v.id())
            .unwrap();
        g.value_mut(a).shape = None;
        g.value_mut(a).dtype = DType::Unknown;
        let lifetimes = analyze_lifetimes(&g, &order);
        let la = lifetimes.iter().find(|l| l.value == a).unwrap();
        assert_eq!(la.bytes, 0);
    }
}
