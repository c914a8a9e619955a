// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-run execution state.
//!
//! Tensors travel through one run via this table, not through the
//! graph, which stays immutable during execution. The table is
//! mutex-guarded so the parallel scheduler's workers can bind and read
//! concurrently; producers always complete before their consumers read
//! (in-degree gating), so a consumer never observes a missing entry.
//!
//! The state also tracks remaining uses of every intermediate: when the
//! last consumer of a value finishes, its tensor is dropped and the
//! pool block becomes reusable mid-run.

use crate::profiling::NodeProfile;
use graph_ir::{Graph, NodeId, ValueId};
use std::collections::HashMap;
use std::sync::Mutex;
use tensor_core::Tensor;

pub struct ExecutionState {
    tensors: Mutex<HashMap<ValueId, Tensor>>,
    /// Remaining consumer count per value; values absent here are
    /// immortal (graph outputs, initializers, inputs).
    remaining_uses: Mutex<HashMap<ValueId, usize>>,
    profiles: Mutex<Vec<NodeProfile>>,
    profiling: bool,
    num_threads: usize,
}

impl ExecutionState {
    /// Seeds the state from the graph: initializer tensors are shared
    /// in read-only, and use counts are derived from consumer lists.
    pub fn new(graph: &Graph, profiling: bool, num_threads: usize) -> Self {
        let mut tensors = HashMap::new();
        let mut remaining_uses = HashMap::new();

        for value in graph.iter_values() {
            if let Some(tensor) = &value.tensor {
                // Initializers are shared read-only across the run.
                tensors.insert(value.id(), tensor.clone());
            }
            let immortal = value.is_initializer()
                || graph.outputs().contains(&value.id())
                || graph.inputs().contains(&value.id());
            if !immortal && !value.consumers().is_empty() {
                remaining_uses.insert(value.id(), value.consumers().len());
            }
        }

        Self {
            tensors: Mutex::new(tensors),
            remaining_uses: Mutex::new(remaining_uses),
            profiles: Mutex::new(Vec::new()),
            profiling,
            num_threads,
        }
    }

    pub fn profiling(&self) -> bool {
        self.profiling
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Binds a tensor to a value, replacing any previous binding.
    pub fn bind(&self, value: ValueId, tensor: Tensor) {
        self.tensors
            .lock()
            .expect("state mutex poisoned")
            .insert(value, tensor);
    }

    /// Returns a handle to the tensor bound to `value`. Cheap: tensors
    /// share storage by `Arc`.
    pub fn get(&self, value: ValueId) -> Option<Tensor> {
        self.tensors
            .lock()
            .expect("state mutex poisoned")
            .get(&value)
            .cloned()
    }

    /// Marks one use of each distinct input value of `node` as spent,
    /// dropping tensors whose last consumer just finished.
    pub fn release_inputs(&self, graph: &Graph, node: NodeId) {
        let mut seen = Vec::new();
        for &input in graph.node(node).inputs() {
            if seen.contains(&input) {
                continue;
            }
            seen.push(input);
        }
        let mut uses = self.remaining_uses.lock().expect("state mutex poisoned");
        let mut tensors = self.tensors.lock().expect("state mutex poisoned");
        for input in seen {
            if let Some(count) = uses.get_mut(&input) {
                *count -= 1;
                if *count == 0 {
                    uses.remove(&input);
                    tensors.remove(&input);
                }
            }
        }
    }

    /// Records one node's profile entry.
    pub fn record_profile(&self, profile: NodeProfile) {
        self.profiles
            .lock()
            .expect("state mutex poisoned")
            .push(profile);
    }

    /// Drains the collected profiles.
    pub fn take_profiles(&self) -> Vec<NodeProfile> {
        std::mem::take(&mut *self.profiles.lock().expect("state mutex poisoned"))
    }

    /// Sum of output tensor sizes currently bound for `node`.
    pub fn output_bytes(&self, graph: &Graph, node: NodeId) -> usize {
        let tensors = self.tensors.lock().expect("state mutex poisoned");
        graph
            .node(node)
            .outputs()
            .iter()
            .filter_map(|id| tensors.get(id))
            .map(|t| t.size_bytes())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    fn two_consumer_graph() -> (Graph, ValueId, NodeId, NodeId) {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(2));
        g.value_mut(x).dtype = DType::F32;
        let mid = g.add_value();
        let y1 = g.add_named_value("y1");
        let y2 = g.add_named_value("y2");

        let producer = g.add_node("Relu", None);
        g.connect_input(producer, x);
        g.connect_output(producer, mid);

        let c1 = g.add_node("Relu", None);
        g.connect_input(c1, mid);
        g.connect_output(c1, y1);
        let c2 = g.add_node("Sigmoid", None);
        g.connect_input(c2, mid);
        g.connect_output(c2, y2);

        g.add_input(x);
        g.add_output(y1);
        g.add_output(y2);
        (g, mid, c1, c2)
    }

    #[test]
    fn test_intermediate_freed_after_last_consumer() {
        let (g, mid, c1, c2) = two_consumer_graph();
        let state = ExecutionState::new(&g, false, 1);
        state.bind(mid, Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap());

        state.release_inputs(&g, c1);
        assert!(state.get(mid).is_some(), "still one consumer left");

        state.release_inputs(&g, c2);
        assert!(state.get(mid).is_none(), "dropped after last consumer");
    }

    #[test]
    fn test_outputs_never_freed() {
        let (g, _mid, c1, _c2) = two_consumer_graph();
        let state = ExecutionState::new(&g, false, 1);
        let y1 = g.find_value_by_name("y1").unwrap();
        state.bind(y1, Tensor::from_f32(Shape::vector(2), &[0.0; 2]).unwrap());

        // y1 has no remaining-use entry; releasing consumers of other
        // values leaves it bound.
        state.release_inputs(&g, c1);
        assert!(state.get(y1).is_some());
    }

    #[test]
    fn test_initializers_seeded() {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(1));
        let w = g.add_initializer(
            "w",
            Tensor::from_f32(Shape::vector(2), &[5.0, 6.0]).unwrap(),
        );
        let y = g.add_value();
        let n = g.add_node("Relu", None);
        g.connect_input(n, x);
        g.connect_output(n, y);
        g.add_input(x);
        g.add_output(y);

        let state = ExecutionState::new(&g, false, 1);
        assert_eq!(state.get(w).unwrap().as_f32(), &[5.0, 6.0]);
    }
}
