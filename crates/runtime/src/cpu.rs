// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The CPU execution provider.
//!
//! Always available; supports every kernel in the operator registry.
//! Kernels are compiled (attribute parsing) once per node during
//! preparation and cached. `Reshape` is dispatched as a zero-copy view
//! instead of invoking the copying kernel.

use crate::provider::{Device, ExecutionProvider};
use crate::{ExecutionState, RuntimeError};
use graph_ir::{Attributes, Graph, NodeId};
use memory_manager::DeviceKind;
use operators::{registry, ExecutionContext, InferenceInput, OpError, Operator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tensor_core::{Shape, Tensor};

// ── Device ─────────────────────────────────────────────────────

/// The host device. Copies are plain byte copies and synchronisation is
/// a no-op.
pub struct CpuDevice {
    id: usize,
}

impl Device for CpuDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn id(&self) -> usize {
        self.id
    }

    fn copy_from_host(&self, src: &Tensor, dst: &mut Tensor) -> Result<(), RuntimeError> {
        src.copy_to(dst).map_err(RuntimeError::from)
    }

    fn copy_to_host(&self, src: &Tensor, dst: &mut Tensor) -> Result<(), RuntimeError> {
        src.copy_to(dst).map_err(RuntimeError::from)
    }

    fn synchronize(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

// ── Provider ───────────────────────────────────────────────────

pub struct CpuExecutionProvider {
    device: Arc<CpuDevice>,
    /// Kernels compiled per node arena slot during preparation.
    kernels: Mutex<HashMap<usize, Arc<dyn Operator>>>,
}

impl CpuExecutionProvider {
    pub fn new() -> Self {
        operators::init_operators();
        Self {
            device: Arc::new(CpuDevice { id: 0 }),
            kernels: Mutex::new(HashMap::new()),
        }
    }

    fn kernel_for(&self, graph: &Graph, node: NodeId) -> Result<Arc<dyn Operator>, RuntimeError> {
        if let Some(kernel) = self
            .kernels
            .lock()
            .expect("kernel cache mutex poisoned")
            .get(&node.index())
        {
            return Ok(Arc::clone(kernel));
        }
        let n = graph.node(node);
        let kernel: Arc<dyn Operator> = Arc::from(registry().create(&n.op_type, &n.attrs)?);
        self.kernels
            .lock()
            .expect("kernel cache mutex poisoned")
            .insert(node.index(), Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Gathers the run-state tensors for a node's inputs.
    fn gather_inputs(
        &self,
        graph: &Graph,
        node: NodeId,
        state: &ExecutionState,
    ) -> Result<Vec<Tensor>, RuntimeError> {
        graph
            .node(node)
            .inputs()
            .iter()
            .map(|&id| {
                state.get(id).ok_or_else(|| {
                    RuntimeError::InvalidArgument(format!(
                        "value {} has no tensor bound when node {} runs",
                        id.index(),
                        node.index()
                    ))
                })
            })
            .collect()
    }

    /// Pre-execution shape check: when the planner recorded a concrete
    /// shape for an output value, the runtime shape must agree.
    fn check_planned_shape(
        graph: &Graph,
        node: NodeId,
        output_index: usize,
        runtime: &Shape,
    ) -> Result<(), RuntimeError> {
        let value_id = graph.node(node).outputs()[output_index];
        if let Some(planned) = &graph.value(value_id).shape {
            if !planned.is_dynamic() && planned != runtime {
                return Err(RuntimeError::Execution {
                    node: graph.node(node).display_name().to_string(),
                    source: OpError::OutputShapeMismatch {
                        op: "dispatch",
                        expected: planned.clone(),
                        actual: runtime.clone(),
                    },
                });
            }
        }
        Ok(())
    }
}

impl Default for CpuExecutionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProvider for CpuExecutionProvider {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn get_device(&self, _device_id: usize) -> Arc<dyn Device> {
        Arc::clone(&self.device) as Arc<dyn Device>
    }

    fn supports_op(&self, op_type: &str) -> bool {
        registry().is_registered(op_type)
    }

    fn create_kernel(
        &self,
        op_type: &str,
        attrs: &Attributes,
    ) -> Result<Box<dyn Operator>, RuntimeError> {
        registry().create(op_type, attrs).map_err(RuntimeError::from)
    }

    fn compile_node(&self, graph: &Graph, node: NodeId) -> Result<(), RuntimeError> {
        let op_type = &graph.node(node).op_type;
        if !self.supports_op(op_type) {
            return Err(RuntimeError::NotFound(format!(
                "cpu provider has no kernel for '{op_type}'"
            )));
        }
        self.kernel_for(graph, node).map(|_| ())
    }

    fn prepare_execution(&self, graph: &mut Graph) -> Result<(), RuntimeError> {
        let claimed: Vec<NodeId> = graph
            .iter_nodes()
            .filter(|n| n.device == DeviceKind::Cpu)
            .map(|n| n.id())
            .collect();
        for node in claimed {
            self.compile_node(graph, node)?;
        }
        let compiled = self
            .kernels
            .lock()
            .expect("kernel cache mutex poisoned")
            .len();
        tracing::debug!("cpu provider prepared {compiled} kernels");
        Ok(())
    }

    fn execute_node(
        &self,
        graph: &Graph,
        node: NodeId,
        state: &ExecutionState,
    ) -> Result<(), RuntimeError> {
        let kernel = self.kernel_for(graph, node)?;
        let inputs = self.gather_inputs(graph, node, state)?;
        let input_refs: Vec<&Tensor> = inputs.iter().collect();
        let node_name = graph.node(node).display_name().to_string();
        let output_ids = graph.node(node).outputs().to_vec();

        // Runtime shape inference uses the actual tensors, so
        // data-dependent rules always resolve here.
        let infer_inputs: Vec<InferenceInput<'_>> = inputs
            .iter()
            .map(|t| InferenceInput::with_tensor(t.shape(), t.dtype(), t))
            .collect();
        let infos = kernel
            .infer_shapes(&infer_inputs)
            .map_err(|source| RuntimeError::Execution {
                node: node_name.clone(),
                source,
            })?;
        if infos.len() < output_ids.len() {
            return Err(RuntimeError::Execution {
                node: node_name,
                source: OpError::InvalidArgument {
                    op: "dispatch",
                    detail: format!(
                        "kernel produced {} shapes for {} outputs",
                        infos.len(),
                        output_ids.len()
                    ),
                },
            });
        }
        for (i, info) in infos.iter().take(output_ids.len()).enumerate() {
            Self::check_planned_shape(graph, node, i, &info.shape)?;
        }

        // Reshape binds a view sharing the input's bytes; everything
        // else gets fresh pool tensors and runs the kernel.
        if graph.node(node).op_type == "Reshape" {
            let view = inputs[0]
                .reshape(infos[0].shape.clone())
                .map_err(RuntimeError::from)?;
            state.bind(output_ids[0], view);
        } else {
            let mut outputs: Vec<Tensor> = infos
                .iter()
                .take(output_ids.len())
                .map(|info| Tensor::new(info.shape.clone(), info.dtype, DeviceKind::Cpu))
                .collect::<Result<_, _>>()?;

            kernel
                .execute(&input_refs, &mut outputs, &ExecutionContext::with_threads(
                    DeviceKind::Cpu,
                    state.num_threads(),
                ))
                .map_err(|source| RuntimeError::Execution {
                    node: node_name,
                    source,
                })?;

            for (id, tensor) in output_ids.iter().zip(outputs) {
                state.bind(*id, tensor);
            }
        }

        drop(inputs);
        state.release_inputs(graph, node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::DType;

    fn relu_graph() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(4));
        g.value_mut(x).dtype = DType::F32;
        let y = g.add_named_value("y");
        let relu = g.add_node("Relu", Some("act".into()));
        g.connect_input(relu, x);
        g.connect_output(relu, y);
        g.add_input(x);
        g.add_output(y);
        (g, relu)
    }

    #[test]
    fn test_execute_relu_node() {
        let (g, relu) = relu_graph();
        let provider = CpuExecutionProvider::new();
        let state = ExecutionState::new(&g, false, 1);
        let x = g.find_value_by_name("x").unwrap();
        state.bind(
            x,
            Tensor::from_f32(Shape::vector(4), &[-1.0, 0.0, 2.0, -3.5]).unwrap(),
        );

        provider.execute_node(&g, relu, &state).unwrap();
        let y = g.find_value_by_name("y").unwrap();
        assert_eq!(state.get(y).unwrap().as_f32(), &[0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_reshape_binds_view() {
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

        let provider = CpuExecutionProvider::new();
        let state = ExecutionState::new(&g, false, 1);
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let input = Tensor::from_f32(Shape::new(vec![2, 3, 4]), &data).unwrap();
        let input_ptr = input.data_ptr();
        state.bind(x, input);

        provider.execute_node(&g, reshape, &state).unwrap();
        let out = state.get(y).unwrap();
        assert_eq!(out.shape().dims(), &[6, 4]);
        // Zero-copy: the view shares the input's data pointer.
        assert_eq!(out.data_ptr(), input_ptr);
        for (i, &v) in out.as_f32().iter().enumerate() {
            assert_eq!(v, i as f32);
        }
    }

    #[test]
    fn test_planned_shape_mismatch_fails() {
        let (mut g, relu) = relu_graph();
        let y = g.find_value_by_name("y").unwrap();
        // Lie about the planned output shape.
        g.value_mut(y).shape = Some(Shape::vector(7));

        let provider = CpuExecutionProvider::new();
        let state = ExecutionState::new(&g, false, 1);
        let x = g.find_value_by_name("x").unwrap();
        state.bind(x, Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap());

        assert!(matches!(
            provider.execute_node(&g, relu, &state),
            Err(RuntimeError::Execution { .. })
        ));
    }

    #[test]
    fn test_compile_unknown_op_fails() {
        let mut g = Graph::new();
        let x = g.add_value();
        let y = g.add_value();
        let node = g.add_node("AlienOp", None);
        g.connect_input(node, x);
        g.connect_output(node, y);
        g.add_input(x);
        g.add_output(y);

        let provider = CpuExecutionProvider::new();
        assert!(matches!(
            provider.compile_node(&g, node),
            Err(RuntimeError::NotFound(_))
        ));
    }
}
