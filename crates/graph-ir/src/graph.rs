// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The computation graph: an arena-backed SSA DAG.
//!
//! # Arena design
//!
//! Nodes and values live in slot vectors keyed by monotonically assigned
//! ids; every cross-reference is an id, never a pointer or borrow. This
//! sidesteps the cyclic-ownership problem a pointer graph would create
//! under Rust's ownership rules, and makes [`Graph::clone`] and the
//! textual serialisation straightforward. `remove_node` tombstones its
//! slot so all other ids stay stable.
//!
//! The graph is closed-world after session preparation: passes mutate it
//! during load, the engine only reads it during runs (tensors bound to
//! values travel through the execution state, not the graph).

use crate::{Attribute, GraphError, Node, NodeId, Value, ValueId};
use std::collections::BinaryHeap;

/// An SSA computation graph.
///
/// Owns all of its nodes and values; nodes reference values (and values
/// reference nodes) by arena id.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) values: Vec<Option<Value>>,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ───────────────────────────────────────────

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, op_type: impl Into<String>, name: Option<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(id, op_type, name)));
        id
    }

    /// Adds an anonymous value and returns its id.
    pub fn add_value(&mut self) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Some(Value::new(id)));
        id
    }

    /// Adds a named value and returns its id.
    pub fn add_named_value(&mut self, name: impl Into<String>) -> ValueId {
        let id = self.add_value();
        self.value_mut(id).name = Some(name.into());
        id
    }

    /// Appends `value` to `node`'s ordered input list and registers the
    /// consumer edge.
    pub fn connect_input(&mut self, node: NodeId, value: ValueId) {
        self.node_mut(node).inputs.push(value);
        self.value_mut(value).add_consumer(node);
    }

    /// Appends `value` to `node`'s ordered output list and sets its
    /// producer.
    pub fn connect_output(&mut self, node: NodeId, value: ValueId) {
        self.node_mut(node).outputs.push(value);
        self.value_mut(value).producer = Some(node);
    }

    /// Replaces every occurrence of `old` in `node`'s inputs with `new`,
    /// maintaining both consumer lists. Used by rewrite passes.
    pub fn replace_input(&mut self, node: NodeId, old: ValueId, new: ValueId) {
        let n = self.node_mut(node);
        let mut replaced = false;
        for input in &mut n.inputs {
            if *input == old {
                *input = new;
                replaced = true;
            }
        }
        if replaced {
            self.value_mut(old).remove_consumer(node);
            self.value_mut(new).add_consumer(node);
        }
    }

    /// Replaces every occurrence of `old` in `node`'s outputs with
    /// `new`, maintaining producer links. Used by rewrite passes that
    /// preserve output identity.
    pub fn replace_output(&mut self, node: NodeId, old: ValueId, new: ValueId) {
        let n = self.node_mut(node);
        let mut replaced = false;
        for output in &mut n.outputs {
            if *output == old {
                *output = new;
                replaced = true;
            }
        }
        if replaced {
            if self.value(old).producer == Some(node) {
                self.value_mut(old).producer = None;
            }
            self.value_mut(new).producer = Some(node);
        }
    }

    /// Rewrites any graph-output entry that references `old` to `new`.
    pub fn replace_graph_output(&mut self, old: ValueId, new: ValueId) {
        for output in &mut self.outputs {
            if *output == old {
                *output = new;
            }
        }
    }

    /// Removes a node, disconnecting it from its values. The slot is
    /// tombstoned so other ids remain valid. Values are never removed;
    /// unreferenced ones are benign (see the optimizer's fusion pass).
    pub fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes[id.0].take() else {
            return;
        };
        for value in node.inputs {
            if let Some(v) = self.values[value.0].as_mut() {
                v.remove_consumer(id);
            }
        }
        for value in node.outputs {
            if let Some(v) = self.values[value.0].as_mut() {
                if v.producer == Some(id) {
                    v.producer = None;
                }
            }
        }
    }

    /// Declares a value as a graph input.
    pub fn add_input(&mut self, value: ValueId) {
        if !self.inputs.contains(&value) {
            self.inputs.push(value);
        }
    }

    /// Declares a value as a graph output.
    pub fn add_output(&mut self, value: ValueId) {
        if !self.outputs.contains(&value) {
            self.outputs.push(value);
        }
    }

    // ── Access ─────────────────────────────────────────────────

    /// Returns the graph-input value ids in declaration order.
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Returns the graph-output value ids in declaration order.
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Returns a node, if the id is live.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Returns a value, if the id is live.
    pub fn get_value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Returns a node.
    ///
    /// # Panics
    /// Panics if the id was removed. Passes operate on live ids from
    /// `topological_sort`, so a stale id is a programming error.
    pub fn node(&self, id: NodeId) -> &Node {
        self.get_node(id).expect("stale node id")
    }

    /// Returns a node mutably.
    ///
    /// # Panics
    /// Panics if the id was removed.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0].as_mut().expect("stale node id")
    }

    /// Returns a value.
    ///
    /// # Panics
    /// Panics if the id was removed.
    pub fn value(&self, id: ValueId) -> &Value {
        self.get_value(id).expect("stale value id")
    }

    /// Returns a value mutably.
    ///
    /// # Panics
    /// Panics if the id was removed.
    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values[id.0].as_mut().expect("stale value id")
    }

    /// Iterates over live nodes in id order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|slot| slot.as_ref())
    }

    /// Iterates over live values in id order.
    pub fn iter_values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter_map(|slot| slot.as_ref())
    }

    /// Returns the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.iter_nodes().count()
    }

    /// Returns the number of live values.
    pub fn value_count(&self) -> usize {
        self.iter_values().count()
    }

    /// Finds a value by name, searching inputs and outputs first.
    pub fn find_value_by_name(&self, name: &str) -> Option<ValueId> {
        let matches = |id: &ValueId| {
            self.get_value(*id)
                .and_then(|v| v.name.as_deref())
                .map(|n| n == name)
                .unwrap_or(false)
        };
        if let Some(id) = self.inputs.iter().find(|id| matches(id)) {
            return Some(*id);
        }
        if let Some(id) = self.outputs.iter().find(|id| matches(id)) {
            return Some(*id);
        }
        self.iter_values()
            .find(|v| v.name.as_deref() == Some(name))
            .map(|v| v.id())
    }

    // ── Edges ──────────────────────────────────────────────────

    /// The distinct produced input values of `node` — the edges that gate
    /// its readiness. Duplicate uses of one value count once.
    pub fn produced_inputs(&self, node: NodeId) -> Vec<ValueId> {
        let mut seen = Vec::new();
        for &input in self.node(node).inputs() {
            if seen.contains(&input) {
                continue;
            }
            if self
                .get_value(input)
                .and_then(|v| v.producer())
                .and_then(|p| self.get_node(p))
                .is_some()
            {
                seen.push(input);
            }
        }
        seen
    }

    // ── Topological sort ───────────────────────────────────────

    /// Kahn's algorithm over producer edges.
    ///
    /// Deterministic: among simultaneously-ready nodes the smallest id
    /// goes first. On a cyclic graph the returned order is partial;
    /// [`validate`](Graph::validate) turns that into an error.
    pub fn topological_sort(&self) -> Vec<NodeId> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in self.iter_nodes() {
            in_degree[node.id().0] = self.produced_inputs(node.id()).len();
        }

        // Min-heap on node id for deterministic tie-breaking.
        let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = self
            .iter_nodes()
            .filter(|n| in_degree[n.id().0] == 0)
            .map(|n| std::cmp::Reverse(n.id().0))
            .collect();

        let mut sorted = Vec::with_capacity(self.node_count());
        while let Some(std::cmp::Reverse(index)) = ready.pop() {
            let id = NodeId(index);
            sorted.push(id);
            for &output in self.node(id).outputs() {
                let Some(value) = self.get_value(output) else {
                    continue;
                };
                for &consumer in value.consumers() {
                    if self.get_node(consumer).is_none() {
                        continue;
                    }
                    in_degree[consumer.0] -= 1;
                    if in_degree[consumer.0] == 0 {
                        ready.push(std::cmp::Reverse(consumer.0));
                    }
                }
            }
        }
        sorted
    }

    // ── Validation ─────────────────────────────────────────────

    /// Enforces the structural invariants.
    ///
    /// Checks, in order: the graph has inputs and outputs; ids are unique
    /// in the arena; every node input resolves to a live value that has a
    /// producer, is a graph input, or is an initializer; every graph
    /// output resolves to a live value; the graph is acyclic. Produced
    /// values that nothing consumes are a warning, not an error.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.inputs.is_empty() {
            return Err(GraphError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(GraphError::NoOutputs);
        }

        // Arena construction assigns ids positionally, so duplicates can
        // only come from a future non-arena loader. Cheap to keep honest.
        let mut seen = std::collections::HashSet::new();
        for node in self.iter_nodes() {
            if !seen.insert(node.id().0) {
                return Err(GraphError::DuplicateId { id: node.id().0 });
            }
        }
        seen.clear();
        for value in self.iter_values() {
            if !seen.insert(value.id().0) {
                return Err(GraphError::DuplicateId { id: value.id().0 });
            }
        }

        for node in self.iter_nodes() {
            for &input in node.inputs() {
                let Some(value) = self.get_value(input) else {
                    return Err(GraphError::MissingValueForInput {
                        node: Some(node.id()),
                        value: input,
                    });
                };
                let produced = value
                    .producer()
                    .map(|p| self.get_node(p).is_some())
                    .unwrap_or(false);
                if !produced && !self.inputs.contains(&input) && !value.is_initializer() {
                    return Err(GraphError::UnproducedInput {
                        node: node.id(),
                        value: input,
                    });
                }
            }
        }

        for &output in &self.outputs {
            if self.get_value(output).is_none() {
                return Err(GraphError::MissingValueForInput {
                    node: None,
                    value: output,
                });
            }
        }

        let sorted = self.topological_sort();
        if sorted.len() != self.node_count() {
            return Err(GraphError::Cycle {
                sorted: sorted.len(),
                total: self.node_count(),
            });
        }

        // Dead outputs: produced but neither consumed nor graph outputs.
        for value in self.iter_values() {
            if value.producer().is_some()
                && value.consumers().is_empty()
                && !self.outputs.contains(&value.id())
            {
                tracing::warn!(
                    "value {} is produced but never consumed",
                    value.id().index()
                );
            }
        }

        Ok(())
    }

    // ── Visualisation ──────────────────────────────────────────

    /// Renders the node graph in Graphviz DOT form.
    pub fn to_dot(&self) -> String {
        use std::fmt::Write;
        let mut out = String::from("digraph G {\n");
        for node in self.iter_nodes() {
            let _ = write!(out, "  node{} [label=\"{}", node.id().index(), node.op_type);
            if let Some(name) = &node.name {
                let _ = write!(out, "\\n{name}");
            }
            out.push_str("\"];\n");
        }
        for node in self.iter_nodes() {
            for &output in node.outputs() {
                let Some(value) = self.get_value(output) else {
                    continue;
                };
                for &consumer in value.consumers() {
                    if self.get_node(consumer).is_some() {
                        let _ = writeln!(
                            out,
                            "  node{} -> node{};",
                            node.id().index(),
                            consumer.index()
                        );
                    }
                }
            }
        }
        out.push_str("}\n");
        out
    }

    // ── Convenience builders (used heavily by tests) ───────────

    /// Adds an initializer: a named value with a bound constant tensor.
    pub fn add_initializer(
        &mut self,
        name: impl Into<String>,
        tensor: tensor_core::Tensor,
    ) -> ValueId {
        let id = self.add_named_value(name);
        let value = self.value_mut(id);
        value.shape = Some(tensor.shape().clone());
        value.dtype = tensor.dtype();
        value.tensor = Some(tensor);
        id
    }

    /// Sets an attribute on a node.
    pub fn set_attr(&mut self, node: NodeId, name: impl Into<String>, attr: Attribute) {
        self.node_mut(node).attrs.set(name, attr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{Shape, Tensor};

    /// x -> Relu -> y -> Relu -> z
    fn chain_graph() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        let y = g.add_value();
        let z = g.add_named_value("z");
        let r1 = g.add_node("Relu", Some("r1".into()));
        let r2 = g.add_node("Relu", Some("r2".into()));
        g.connect_input(r1, x);
        g.connect_output(r1, y);
        g.connect_input(r2, y);
        g.connect_output(r2, z);
        g.add_input(x);
        g.add_output(z);
        (g, r1, r2)
    }

    #[test]
    fn test_chain_validates_and_sorts() {
        let (g, r1, r2) = chain_graph();
        g.validate().unwrap();
        assert_eq!(g.topological_sort(), vec![r1, r2]);
    }

    #[test]
    fn test_topo_sort_is_id_deterministic() {
        // Diamond: two independent middle nodes must sort by id.
        let mut g = Graph::new();
        let x = g.add_value();
        let a_out = g.add_value();
        let b_out = g.add_value();
        let y = g.add_value();
        let a = g.add_node("Relu", None);
        let b = g.add_node("Sigmoid", None);
        let join = g.add_node("Add", None);
        g.connect_input(a, x);
        g.connect_output(a, a_out);
        g.connect_input(b, x);
        g.connect_output(b, b_out);
        g.connect_input(join, a_out);
        g.connect_input(join, b_out);
        g.connect_output(join, y);
        g.add_input(x);
        g.add_output(y);

        let order = g.topological_sort();
        assert_eq!(order, vec![a, b, join]);
        // Producers precede consumers.
        let pos = |id: NodeId| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(join));
        assert!(pos(b) < pos(join));
    }

    #[test]
    fn test_duplicate_input_value() {
        // Add(x, x) must sort and validate.
        let mut g = Graph::new();
        let x = g.add_value();
        let y = g.add_value();
        let add = g.add_node("Add", None);
        g.connect_input(add, x);
        g.connect_input(add, x);
        g.connect_output(add, y);
        g.add_input(x);
        g.add_output(y);

        g.validate().unwrap();
        assert_eq!(g.node(add).inputs().len(), 2);
        assert_eq!(g.topological_sort(), vec![add]);
    }

    #[test]
    fn test_validate_no_inputs() {
        let mut g = Graph::new();
        let y = g.add_value();
        g.add_output(y);
        assert!(matches!(g.validate(), Err(GraphError::NoInputs)));
    }

    #[test]
    fn test_validate_no_outputs() {
        let mut g = Graph::new();
        let x = g.add_value();
        g.add_input(x);
        assert!(matches!(g.validate(), Err(GraphError::NoOutputs)));
    }

    #[test]
    fn test_validate_unproduced_input() {
        let mut g = Graph::new();
        let x = g.add_value();
        let dangling = g.add_value();
        let y = g.add_value();
        let add = g.add_node("Add", None);
        g.connect_input(add, x);
        g.connect_input(add, dangling);
        g.connect_output(add, y);
        g.add_input(x);
        g.add_output(y);
        assert!(matches!(
            g.validate(),
            Err(GraphError::UnproducedInput { .. })
        ));
    }

    #[test]
    fn test_initializer_satisfies_validation() {
        let mut g = Graph::new();
        let x = g.add_value();
        let w = g.add_initializer("w", Tensor::from_f32(Shape::vector(1), &[2.0]).unwrap());
        let y = g.add_value();
        let mul = g.add_node("Mul", None);
        g.connect_input(mul, x);
        g.connect_input(mul, w);
        g.connect_output(mul, y);
        g.add_input(x);
        g.add_output(y);
        g.validate().unwrap();
    }

    #[test]
    fn test_validate_cycle() {
        let mut g = Graph::new();
        let x = g.add_value();
        let a_out = g.add_value();
        let b_out = g.add_value();
        let a = g.add_node("Add", None);
        let b = g.add_node("Relu", None);
        // a consumes x and b's output; b consumes a's output: cycle.
        g.connect_input(a, x);
        g.connect_input(a, b_out);
        g.connect_output(a, a_out);
        g.connect_input(b, a_out);
        g.connect_output(b, b_out);
        g.add_input(x);
        g.add_output(a_out);
        assert!(matches!(g.validate(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_remove_node_disconnects() {
        let (mut g, r1, r2) = chain_graph();
        let y = g.node(r1).outputs()[0];
        g.remove_node(r2);

        assert!(g.get_node(r2).is_none());
        assert!(g.value(y).consumers().is_empty());
        assert_eq!(g.topological_sort(), vec![r1]);
        // r1's id is unaffected by the removal.
        assert_eq!(g.node(r1).op_type, "Relu");
    }

    #[test]
    fn test_replace_output_rebinds_producer() {
        let (mut g, r1, _r2) = chain_graph();
        let old = g.node(r1).outputs()[0];
        let substitute = g.add_value();
        g.replace_output(r1, old, substitute);

        assert_eq!(g.node(r1).outputs(), &[substitute]);
        assert_eq!(g.value(substitute).producer(), Some(r1));
        assert_eq!(g.value(old).producer(), None);
    }

    #[test]
    fn test_replace_input_reroutes() {
        let (mut g, _r1, r2) = chain_graph();
        let y = g.node(r2).inputs()[0];
        let substitute = g.add_initializer(
            "sub",
            Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap(),
        );
        g.replace_input(r2, y, substitute);

        assert_eq!(g.node(r2).inputs(), &[substitute]);
        assert!(g.value(y).consumers().is_empty());
        assert_eq!(g.value(substitute).consumers(), &[r2]);
    }

    #[test]
    fn test_clone_preserves_structure() {
        let (g, r1, r2) = chain_graph();
        let cloned = g.clone();
        cloned.validate().unwrap();
        assert_eq!(cloned.topological_sort(), vec![r1, r2]);
        assert_eq!(cloned.node_count(), g.node_count());
        assert_eq!(cloned.inputs(), g.inputs());
        assert_eq!(cloned.outputs(), g.outputs());
    }

    #[test]
    fn test_find_value_by_name() {
        let (g, _, _) = chain_graph();
        assert!(g.find_value_by_name("x").is_some());
        assert!(g.find_value_by_name("z").is_some());
        assert!(g.find_value_by_name("missing").is_none());
    }

    #[test]
    fn test_to_dot() {
        let (g, _, _) = chain_graph();
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("Relu"));
        assert!(dot.contains("->"));
    }
}
