// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! SSA values: the data edges of the computation graph.

use crate::NodeId;
use memory_manager::DeviceKind;
use tensor_core::{DType, Shape, Tensor, TensorLayout};

/// Identifies a [`Value`] within its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0
    }

    /// Builds an id from a raw arena index (used by the textual loader).
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// A named SSA slot carrying (eventually) a tensor.
///
/// A value is one of:
/// - a **graph input** — no producer; the caller binds a tensor at run
///   time;
/// - an **initializer** — no producer; a tensor was materialised at load
///   time (typically a weight);
/// - a **node output** — exactly one producer; the tensor is filled
///   during execution.
///
/// Shape and dtype metadata live here (not only on tensors) so that shape
/// inference can annotate values the planner has not allocated yet.
#[derive(Debug, Clone)]
pub struct Value {
    id: ValueId,
    /// Optional stable name, used for input/output binding by name.
    pub name: Option<String>,
    /// The producing node, if any.
    pub(crate) producer: Option<NodeId>,
    /// Nodes that consume this value, deduplicated, in first-use order.
    pub(crate) consumers: Vec<NodeId>,
    /// The bound tensor. Present for initializers from load time, and for
    /// intermediates once execution (or constant folding) fills them.
    pub tensor: Option<Tensor>,
    /// Inferred extents, if shape inference has visited this value.
    pub shape: Option<Shape>,
    /// Inferred element type; `Unknown` until inference visits.
    pub dtype: DType,
    /// Physical layout, maintained by the layout-optimization pass.
    pub layout: TensorLayout,
    /// Device this value's tensor lives (or will live) on.
    pub device: DeviceKind,
}

impl Value {
    pub(crate) fn new(id: ValueId) -> Self {
        Self {
            id,
            name: None,
            producer: None,
            consumers: Vec::new(),
            tensor: None,
            shape: None,
            dtype: DType::Unknown,
            layout: TensorLayout::default(),
            device: DeviceKind::Cpu,
        }
    }

    /// Returns this value's id.
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// Returns the producing node, if any.
    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    /// Returns the consuming nodes.
    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    /// An initializer holds a tensor materialised at load time and has no
    /// producer.
    pub fn is_initializer(&self) -> bool {
        self.producer.is_none() && self.tensor.is_some()
    }

    /// The shape to use for planning: inference metadata first, falling
    /// back to a bound tensor's shape.
    pub fn effective_shape(&self) -> Option<&Shape> {
        self.shape
            .as_ref()
            .or_else(|| self.tensor.as_ref().map(|t| t.shape()))
    }

    /// The dtype to use for planning, `Unknown` when nothing is known.
    pub fn effective_dtype(&self) -> DType {
        if self.dtype != DType::Unknown {
            return self.dtype;
        }
        self.tensor.as_ref().map(|t| t.dtype()).unwrap_or(DType::Unknown)
    }

    pub(crate) fn add_consumer(&mut self, node: NodeId) {
        if !self.consumers.contains(&node) {
            self.consumers.push(node);
        }
    }

    pub(crate) fn remove_consumer(&mut self, node: NodeId) {
        self.consumers.retain(|&n| n != node);
    }
}
