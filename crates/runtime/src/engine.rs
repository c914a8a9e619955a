// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution engine.
//!
//! Owns a scheduler and the ordered provider list, and drives one run:
//! bind inputs, dispatch each node through its assigned provider,
//! gather outputs. The graph itself is read-only here — tensors flow
//! through the [`ExecutionState`].

use crate::profiling::{NodeProfile, ProfilingResult};
use crate::provider::{Device, ExecutionProvider};
use crate::scheduler::Scheduler;
use crate::{ExecutionState, RuntimeError};
use graph_ir::{Graph, NodeId};
use memory_manager::DeviceKind;
use std::sync::Arc;
use std::time::Instant;
use tensor_core::Tensor;

pub struct Engine {
    scheduler: Box<dyn Scheduler>,
    providers: Vec<Arc<dyn ExecutionProvider>>,
    /// Node arena slot → index into `providers`.
    assignments: Vec<usize>,
    num_threads: usize,
}

impl Engine {
    pub fn new(
        scheduler: Box<dyn Scheduler>,
        providers: Vec<Arc<dyn ExecutionProvider>>,
        assignments: Vec<usize>,
        num_threads: usize,
    ) -> Self {
        Self {
            scheduler,
            providers,
            assignments,
            num_threads,
        }
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    /// Runs the graph once.
    ///
    /// 1. Verifies the input arity and binds each input tensor to its
    ///    graph-input value.
    /// 2. Walks the scheduler's order; every node's provider allocates
    ///    outputs (per plan or deferred) and executes the kernel.
    /// 3. Gathers the graph-output tensors in declaration order.
    pub fn run(&self, graph: &Graph, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, RuntimeError> {
        self.run_internal(graph, inputs, false).map(|(out, _)| out)
    }

    /// [`run`](Engine::run) with per-node wall-time and output-byte
    /// accounting.
    pub fn run_with_profile(
        &self,
        graph: &Graph,
        inputs: Vec<Tensor>,
    ) -> Result<(Vec<Tensor>, ProfilingResult), RuntimeError> {
        let (outputs, profile) = self.run_internal(graph, inputs, true)?;
        Ok((outputs, profile.expect("profiling was requested")))
    }

    fn run_internal(
        &self,
        graph: &Graph,
        inputs: Vec<Tensor>,
        profiling: bool,
    ) -> Result<(Vec<Tensor>, Option<ProfilingResult>), RuntimeError> {
        let started = Instant::now();
        if inputs.len() != graph.inputs().len() {
            return Err(RuntimeError::InvalidArgument(format!(
                "graph expects {} inputs, got {}",
                graph.inputs().len(),
                inputs.len()
            )));
        }

        let state = ExecutionState::new(graph, profiling, self.num_threads);
        for (&value_id, tensor) in graph.inputs().iter().zip(inputs) {
            let value = graph.value(value_id);
            if let Some(declared) = &value.shape {
                if declared != tensor.shape() {
                    return Err(RuntimeError::InvalidArgument(format!(
                        "input '{}' expects shape {declared}, got {}",
                        value.name.as_deref().unwrap_or("<unnamed>"),
                        tensor.shape()
                    )));
                }
            }
            state.bind(value_id, tensor);
        }

        let dispatch = |node: NodeId| -> Result<(), RuntimeError> {
            let provider = self.provider_for(node)?;
            if state.profiling() {
                let node_started = Instant::now();
                provider.execute_node(graph, node, &state)?;
                let elapsed = node_started.elapsed();
                let n = graph.node(node);
                state.record_profile(NodeProfile {
                    name: n.display_name().to_string(),
                    op_type: n.op_type.clone(),
                    time_ms: elapsed.as_secs_f64() * 1000.0,
                    bytes: state.output_bytes(graph, node),
                });
                Ok(())
            } else {
                provider.execute_node(graph, node, &state)
            }
        };

        self.scheduler.run(graph, &dispatch)?;

        let mut outputs = Vec::with_capacity(graph.outputs().len());
        for &value_id in graph.outputs() {
            let tensor = state.get(value_id).ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "graph output value {} was never produced",
                    value_id.index()
                ))
            })?;
            outputs.push(tensor);
        }

        let profile = profiling
            .then(|| ProfilingResult::from_parts(started.elapsed(), state.take_profiles()));
        Ok((outputs, profile))
    }

    fn provider_for(&self, node: NodeId) -> Result<&Arc<dyn ExecutionProvider>, RuntimeError> {
        self.assignments
            .get(node.index())
            .copied()
            .filter(|&i| i != usize::MAX)
            .and_then(|i| self.providers.get(i))
            .ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "node {} has no assigned execution provider",
                    node.index()
                ))
            })
    }

    // ── Batch execution ────────────────────────────────────────

    /// Runs the graph once per batch entry, sequentially.
    pub fn run_batch(
        &self,
        graph: &Graph,
        batch: Vec<Vec<Tensor>>,
    ) -> Result<Vec<Vec<Tensor>>, RuntimeError> {
        if batch.is_empty() {
            return Err(RuntimeError::InvalidArgument("empty batch".into()));
        }
        let arity = batch[0].len();
        if batch.iter().any(|entry| entry.len() != arity) {
            return Err(RuntimeError::InvalidArgument(
                "inconsistent input count across batch entries".into(),
            ));
        }
        batch
            .into_iter()
            .map(|entry| self.run(graph, entry))
            .collect()
    }

    /// Concatenates matching inputs along the leading dimension, runs
    /// the graph once, and slices the outputs back per entry.
    ///
    /// Requires every entry's inputs to share shapes exactly.
    pub fn run_batch_merged(
        &self,
        graph: &Graph,
        batch: Vec<Vec<Tensor>>,
    ) -> Result<Vec<Vec<Tensor>>, RuntimeError> {
        if batch.is_empty() {
            return Err(RuntimeError::InvalidArgument("empty batch".into()));
        }
        let batch_len = batch.len();
        let arity = batch[0].len();
        for entry in &batch {
            if entry.len() != arity {
                return Err(RuntimeError::InvalidArgument(
                    "inconsistent input count across batch entries".into(),
                ));
            }
            for (t, reference) in entry.iter().zip(&batch[0]) {
                if t.shape().dims() != reference.shape().dims() {
                    return Err(RuntimeError::InvalidArgument(format!(
                        "batch entries disagree on input shape: {} vs {}",
                        t.shape(),
                        reference.shape()
                    )));
                }
            }
        }

        // Merge along dim 0 (row-major: plain byte concatenation).
        let mut merged_inputs = Vec::with_capacity(arity);
        for i in 0..arity {
            let reference = &batch[0][i];
            let mut dims = reference.shape().dims().to_vec();
            if dims.is_empty() {
                return Err(RuntimeError::InvalidArgument(
                    "merged batching requires rank >= 1 inputs".into(),
                ));
            }
            dims[0] *= batch_len as i64;
            let mut bytes =
                Vec::with_capacity(reference.size_bytes() * batch_len);
            for entry in &batch {
                bytes.extend_from_slice(entry[i].as_bytes());
            }
            merged_inputs.push(Tensor::from_bytes(
                dims.into(),
                reference.dtype(),
                &bytes,
            )?);
        }

        let merged_outputs = self.run(graph, merged_inputs)?;

        // Split each output back along dim 0.
        let mut results: Vec<Vec<Tensor>> = (0..batch_len).map(|_| Vec::new()).collect();
        for output in merged_outputs {
            let dims = output.shape().dims().to_vec();
            if dims.is_empty() || dims[0] % batch_len as i64 != 0 {
                return Err(RuntimeError::InvalidArgument(format!(
                    "output shape {} cannot be split into {batch_len} entries",
                    output.shape()
                )));
            }
            let per_entry = dims[0] / batch_len as i64;
            for (b, result) in results.iter_mut().enumerate() {
                let start = b as i64 * per_entry;
                let mut starts = vec![0; dims.len()];
                let mut ends = dims.clone();
                starts[0] = start;
                ends[0] = start + per_entry;
                let steps = vec![1; dims.len()];
                result.push(output.slice(&starts, &ends, &steps)?);
            }
        }
        Ok(results)
    }

    // ── Cross-device copies ────────────────────────────────────

    /// Copies `src` into `dst`, staging through a host tensor when the
    /// two devices differ and neither is the host.
    pub fn copy_between(
        src: &Tensor,
        dst: &mut Tensor,
        src_device: &dyn Device,
        dst_device: &dyn Device,
    ) -> Result<(), RuntimeError> {
        if src.device() == dst.device() {
            return src.copy_to(dst).map_err(RuntimeError::from);
        }
        if src.device().is_host() {
            return dst_device.copy_from_host(src, dst);
        }
        if dst.device().is_host() {
            return src_device.copy_to_host(src, dst);
        }
        // Neither side is the host: stage through a host tensor owned
        // by this call.
        let mut staging = Tensor::new(src.shape().clone(), src.dtype(), DeviceKind::Cpu)?;
        src_device.copy_to_host(src, &mut staging)?;
        dst_device.copy_from_host(&staging, dst)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.scheduler.name())
            .field("providers", &self.providers.len())
            .field("num_threads", &self.num_threads)
            .finish()
    }
}
