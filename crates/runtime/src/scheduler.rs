// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node scheduling policies.
//!
//! Three interchangeable schedulers drive the engine's dispatch
//! closure:
//!
//! - [`TopologicalScheduler`] — single-threaded, topological order.
//! - [`PipelineScheduler`] — partitions the topological order into `k`
//!   stages; staging is informational in this implementation and
//!   execution stays single-threaded per stage.
//! - [`ParallelScheduler`] — a worker pool over the dependency DAG:
//!   in-degree gating, a condvar-guarded ready queue, first-error-wins
//!   cancellation.

use crate::RuntimeError;
use graph_ir::{Graph, NodeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

/// Dispatches one node; supplied by the engine.
pub type Dispatch<'a> = dyn Fn(NodeId) -> Result<(), RuntimeError> + Sync + 'a;

/// A policy for the order (and concurrency) of node dispatch.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &'static str;

    /// The sequential order this scheduler would execute in.
    fn execution_order(&self, graph: &Graph) -> Vec<NodeId>;

    /// Drives `dispatch` over every node, honoring dependencies.
    fn run(&self, graph: &Graph, dispatch: &Dispatch<'_>) -> Result<(), RuntimeError>;
}

// ── Topological ────────────────────────────────────────────────

/// Single-threaded execution in topological order.
pub struct TopologicalScheduler;

impl Scheduler for TopologicalScheduler {
    fn name(&self) -> &'static str {
        "topological"
    }

    fn execution_order(&self, graph: &Graph) -> Vec<NodeId> {
        graph.topological_sort()
    }

    fn run(&self, graph: &Graph, dispatch: &Dispatch<'_>) -> Result<(), RuntimeError> {
        for node in self.execution_order(graph) {
            dispatch(node)?;
        }
        Ok(())
    }
}

// ── Pipeline ───────────────────────────────────────────────────

/// Partitions nodes into `stages` contiguous groups by topological
/// position. Stages may later map onto distinct devices; here they are
/// informational and run one after the other.
pub struct PipelineScheduler {
    stages: usize,
}

impl PipelineScheduler {
    pub fn new(stages: usize) -> Self {
        Self {
            stages: stages.max(1),
        }
    }

    /// The stage partition of the topological order.
    pub fn partition(&self, graph: &Graph) -> Vec<Vec<NodeId>> {
        let order = graph.topological_sort();
        if order.is_empty() {
            return Vec::new();
        }
        let stages = self.stages.min(order.len());
        let per_stage = order.len().div_ceil(stages);
        order
            .chunks(per_stage)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

impl Scheduler for PipelineScheduler {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn execution_order(&self, graph: &Graph) -> Vec<NodeId> {
        self.partition(graph).into_iter().flatten().collect()
    }

    fn run(&self, graph: &Graph, dispatch: &Dispatch<'_>) -> Result<(), RuntimeError> {
        for (index, stage) in self.partition(graph).into_iter().enumerate() {
            tracing::debug!("pipeline stage {index}: {} nodes", stage.len());
            for node in stage {
                dispatch(node)?;
            }
        }
        Ok(())
    }
}

// ── Parallel ───────────────────────────────────────────────────

/// Worker-pool DAG execution.
///
/// Each node's in-degree counts its distinct produced inputs. Workers
/// pop ready nodes under a mutex, execute outside it, then decrement
/// consumers' in-degrees and signal. The first error stops dispatch of
/// new nodes; in-flight nodes finish naturally and all workers drain.
pub struct ParallelScheduler {
    num_threads: usize,
}

impl ParallelScheduler {
    /// `num_threads == 0` selects the hardware concurrency.
    pub fn new(num_threads: usize) -> Self {
        let resolved = if num_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            num_threads
        };
        Self {
            num_threads: resolved,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

struct ParallelState {
    ready: VecDeque<NodeId>,
    in_degree: HashMap<NodeId, usize>,
    completed: usize,
    total: usize,
    error: Option<RuntimeError>,
}

impl ParallelState {
    fn finished(&self) -> bool {
        self.completed == self.total || self.error.is_some()
    }
}

impl Scheduler for ParallelScheduler {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn execution_order(&self, graph: &Graph) -> Vec<NodeId> {
        graph.topological_sort()
    }

    fn run(&self, graph: &Graph, dispatch: &Dispatch<'_>) -> Result<(), RuntimeError> {
        let order = graph.topological_sort();
        let total = order.len();
        if total == 0 {
            return Ok(());
        }

        let mut in_degree = HashMap::with_capacity(total);
        let mut ready = VecDeque::new();
        for &node in &order {
            let degree = graph.produced_inputs(node).len();
            in_degree.insert(node, degree);
            if degree == 0 {
                ready.push_back(node);
            }
        }

        let state = Mutex::new(ParallelState {
            ready,
            in_degree,
            completed: 0,
            total,
            error: None,
        });
        let condvar = Condvar::new();

        std::thread::scope(|scope| {
            for _ in 0..self.num_threads.min(total) {
                scope.spawn(|| {
                    loop {
                        let node = {
                            let mut guard = state.lock().expect("scheduler mutex poisoned");
                            loop {
                                if guard.finished() {
                                    return;
                                }
                                if let Some(node) = guard.ready.pop_front() {
                                    break node;
                                }
                                guard = condvar
                                    .wait(guard)
                                    .expect("scheduler mutex poisoned");
                            }
                        };

                        let result = dispatch(node);

                        let mut guard = state.lock().expect("scheduler mutex poisoned");
                        match result {
                            Ok(()) => {
                                guard.completed += 1;
                                for &output in graph.node(node).outputs() {
                                    let Some(value) = graph.get_value(output) else {
                                        continue;
                                    };
                                    for &consumer in value.consumers() {
                                        if let Some(degree) =
                                            guard.in_degree.get_mut(&consumer)
                                        {
                                            *degree -= 1;
                                            if *degree == 0 {
                                                guard.ready.push_back(consumer);
                                            }
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                // First error wins; later ones are logged.
                                if guard.error.is_none() {
                                    guard.error = Some(e);
                                } else {
                                    tracing::warn!("suppressed secondary error: {e}");
                                }
                            }
                        }
                        let done = guard.finished();
                        drop(guard);
                        condvar.notify_all();
                        if done {
                            return;
                        }
                    }
                });
            }
        });

        let mut guard = state.into_inner().expect("scheduler mutex poisoned");
        match guard.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
