// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The inference session with a type-state–enforced lifecycle.
//!
//! ```text
//! Session<Created>
//!     │  .load_model() / .load_model_from_graph()
//!     ▼
//! Session<ModelLoaded>   — validated, shape-inferred, optimized,
//!     │  .prepare()        providers assigned
//!     ▼
//! Session<Prepared>      — memory planned, kernels compiled
//!     │  .ready()
//!     ▼
//! Session<Ready>         — providers prepared; run()/run_async()
//! ```
//!
//! Each transition consumes the old value and returns the new one, so
//! calling `run` before preparation is a compile error, not a runtime
//! check.

use crate::config::{OptimizationLevel, SchedulerKind, SessionOptions};
use crate::engine::Engine;
use crate::profiling::ProfilingResult;
use crate::provider::{assign_providers, init_providers, provider_registry, ExecutionProvider};
use crate::scheduler::{ParallelScheduler, PipelineScheduler, Scheduler, TopologicalScheduler};
use crate::RuntimeError;
use graph_ir::Graph;
use memory_planner::{plan_memory, MemoryPlan};
use operators::{infer_graph, init_operators, OpError};
use optimizer::{
    ConstantFolding, DeadCodeElimination, MemoryLayoutOptimization, OperatorFusion, PassManager,
    SubgraphReplacement,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tensor_core::{Shape, Tensor};

// ── Type-state markers ─────────────────────────────────────────

/// No model loaded yet.
#[derive(Debug)]
pub struct Created;

/// Graph loaded, validated, optimized; providers assigned.
#[derive(Debug)]
pub struct ModelLoaded;

/// Memory planned and kernels compiled.
#[derive(Debug)]
pub struct Prepared;

/// Providers prepared; the session accepts runs.
#[derive(Debug)]
pub struct Ready;

/// Sealed marker for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Created {}
impl SessionState for ModelLoaded {}
impl SessionState for Prepared {}
impl SessionState for Ready {}

/// States that carry a loaded model, for introspection methods.
pub trait ModelBearing: SessionState {}
impl ModelBearing for ModelLoaded {}
impl ModelBearing for Prepared {}
impl ModelBearing for Ready {}

// ── Session ────────────────────────────────────────────────────

/// A loaded, optimized, prepared model ready for repeated invocation.
///
/// # Example
/// ```no_run
/// use runtime::{Session, SessionOptions};
///
/// # fn example() -> Result<(), runtime::RuntimeError> {
/// let session = Session::create(SessionOptions::default())?
///     .load_model(std::path::Path::new("model.graph.txt"))?
///     .prepare()?
///     .ready()?;
/// let outputs = session.run(vec![])?;
/// # Ok(())
/// # }
/// ```
pub struct Session<S: SessionState = Created> {
    options: SessionOptions,
    providers: Vec<Arc<dyn ExecutionProvider>>,
    graph: Option<Graph>,
    graph_shared: Option<Arc<Graph>>,
    assignments: Vec<usize>,
    plan: Option<MemoryPlan>,
    engine: Option<Arc<Engine>>,
    _state: std::marker::PhantomData<S>,
}

// ── Created ────────────────────────────────────────────────────

impl Session<Created> {
    /// Creates a session: initialises the process-wide registries and
    /// pools, and resolves the configured providers in priority order.
    ///
    /// # Errors
    /// [`RuntimeError::NotFound`] for an unknown or unavailable
    /// provider name.
    pub fn create(options: SessionOptions) -> Result<Self, RuntimeError> {
        init_operators();
        init_providers();
        memory_manager::init_pools(options.memory_pool_size);

        let mut providers: Vec<Arc<dyn ExecutionProvider>> = Vec::new();
        for name in &options.execution_providers {
            let provider = provider_registry().create(name).ok_or_else(|| {
                RuntimeError::NotFound(format!("execution provider '{name}' is not registered"))
            })?;
            if !provider.is_available() {
                return Err(RuntimeError::NotFound(format!(
                    "execution provider '{name}' is not available"
                )));
            }
            providers.push(provider);
        }
        // The CPU provider is the universal fallback.
        if !providers.iter().any(|p| p.device_kind().is_host()) {
            let cpu = provider_registry()
                .create("cpu")
                .ok_or_else(|| RuntimeError::NotFound("cpu provider missing".into()))?;
            providers.push(cpu);
        }

        tracing::info!(
            "session created: {} providers, scheduler {:?}",
            providers.len(),
            options.scheduler
        );
        Ok(Self {
            options,
            providers,
            graph: None,
            graph_shared: None,
            assignments: Vec::new(),
            plan: None,
            engine: None,
            _state: std::marker::PhantomData,
        })
    }

    /// Loads a model from the internal textual graph form on disk.
    pub fn load_model(self, path: &Path) -> Result<Session<ModelLoaded>, RuntimeError> {
        let text = std::fs::read_to_string(path)?;
        let graph = Graph::from_text(&text)
            .map_err(|e| RuntimeError::InvalidModel(format!("{}: {e}", path.display())))?;
        self.load_model_from_graph(graph)
    }

    /// Loads a model from in-memory bytes of the textual graph form.
    pub fn load_model_from_memory(
        self,
        bytes: &[u8],
    ) -> Result<Session<ModelLoaded>, RuntimeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RuntimeError::InvalidModel(format!("model is not UTF-8: {e}")))?;
        let graph = Graph::from_text(text)
            .map_err(|e| RuntimeError::InvalidModel(e.to_string()))?;
        self.load_model_from_graph(graph)
    }

    /// Loads a graph produced by an external parser.
    ///
    /// Validates, runs shape inference, drives the optimizer pipeline
    /// selected by the options, applies provider-specific rewrites, and
    /// assigns every node to a provider.
    pub fn load_model_from_graph(
        mut self,
        mut graph: Graph,
    ) -> Result<Session<ModelLoaded>, RuntimeError> {
        graph
            .validate()
            .map_err(|e| RuntimeError::InvalidModel(e.to_string()))?;

        let report = infer_graph(&mut graph);
        tracing::info!(
            "shape inference: {} nodes annotated, {} skipped",
            report.inferred,
            report.skipped
        );

        let manager = self.build_pass_manager();
        manager.optimize(&mut graph)?;

        for provider in &self.providers {
            provider.optimize_graph(&mut graph)?;
        }

        // Passes may have introduced values; annotate them too.
        infer_graph(&mut graph);

        self.assignments = assign_providers(&mut graph, &self.providers)?;
        tracing::info!(
            "model loaded: {} nodes, {} values",
            graph.node_count(),
            graph.value_count()
        );

        Ok(Session {
            options: self.options,
            providers: self.providers,
            graph: Some(graph),
            graph_shared: None,
            assignments: self.assignments,
            plan: None,
            engine: None,
            _state: std::marker::PhantomData,
        })
    }

    fn build_pass_manager(&self) -> PassManager {
        let mut manager = PassManager::new();
        let level = self.options.optimization_level;
        if level == OptimizationLevel::None {
            return manager;
        }
        manager.register(Box::new(ConstantFolding));
        manager.register(Box::new(DeadCodeElimination));
        if level == OptimizationLevel::Extended || level == OptimizationLevel::All {
            if self.options.enable_operator_fusion {
                manager.register(Box::new(OperatorFusion));
            }
            manager.register(Box::new(SubgraphReplacement));
        }
        if level == OptimizationLevel::All {
            manager.register(Box::new(MemoryLayoutOptimization));
        }
        manager
    }
}

// ── ModelLoaded ────────────────────────────────────────────────

impl Session<ModelLoaded> {
    /// Plans buffer reuse and compiles every node's kernel.
    /// Preparation failures surface here, before the first run.
    pub fn prepare(mut self) -> Result<Session<Prepared>, RuntimeError> {
        let graph = self.graph.as_ref().expect("graph exists in ModelLoaded");
        let order = graph.topological_sort();

        let mut prebound = HashSet::new();
        for provider in &self.providers {
            prebound.extend(provider.prebound_values(graph));
        }
        let plan = plan_memory(graph, &order, &prebound);
        tracing::info!("{}", plan.summary());

        for &node_id in &order {
            let provider = &self.providers[self.assignments[node_id.index()]];
            provider.compile_node(graph, node_id)?;
        }
        self.plan = Some(plan);

        Ok(Session {
            options: self.options,
            providers: self.providers,
            graph: self.graph,
            graph_shared: None,
            assignments: self.assignments,
            plan: self.plan,
            engine: None,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Prepared ───────────────────────────────────────────────────

impl Session<Prepared> {
    /// Lets each provider prepare execution (device assignment, output
    /// pre-binding, validation), then builds the engine.
    pub fn ready(mut self) -> Result<Session<Ready>, RuntimeError> {
        let mut graph = self.graph.take().expect("graph exists in Prepared");
        for provider in &self.providers {
            provider.prepare_execution(&mut graph)?;
        }

        let scheduler: Box<dyn Scheduler> = match self.options.scheduler {
            SchedulerKind::Topological => Box::new(TopologicalScheduler),
            SchedulerKind::Pipeline => {
                Box::new(PipelineScheduler::new(self.options.pipeline_stages))
            }
            SchedulerKind::Parallel => {
                Box::new(ParallelScheduler::new(self.options.num_threads))
            }
        };
        let engine = Engine::new(
            scheduler,
            self.providers.clone(),
            self.assignments.clone(),
            self.options.resolve_threads(),
        );
        tracing::info!("session ready: {engine:?}");

        Ok(Session {
            options: self.options,
            providers: self.providers,
            graph: None,
            graph_shared: Some(Arc::new(graph)),
            assignments: self.assignments,
            plan: self.plan,
            engine: Some(Arc::new(engine)),
            _state: std::marker::PhantomData,
        })
    }

    /// Returns the memory plan computed during preparation.
    pub fn memory_plan(&self) -> &MemoryPlan {
        self.plan.as_ref().expect("plan exists in Prepared")
    }
}

// ── Ready ──────────────────────────────────────────────────────

impl Session<Ready> {
    /// Runs inference on positionally-bound inputs.
    ///
    /// With `enable_profiling` set, every run also records per-node
    /// timings and logs the summary.
    pub fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, RuntimeError> {
        if self.options.enable_profiling {
            let (outputs, profile) = self.engine().run_with_profile(self.graph_ref(), inputs)?;
            tracing::info!("{}", profile.summary());
            Ok(outputs)
        } else {
            self.engine().run(self.graph_ref(), inputs)
        }
    }

    /// Runs inference with name-keyed inputs and outputs.
    pub fn run_named(
        &self,
        mut inputs: HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>, RuntimeError> {
        let names = self.input_names();
        let mut positional = Vec::with_capacity(names.len());
        for name in &names {
            let tensor = inputs.remove(name).ok_or_else(|| {
                RuntimeError::InvalidArgument(format!("missing input '{name}'"))
            })?;
            positional.push(tensor);
        }
        if let Some(extra) = inputs.keys().next() {
            return Err(RuntimeError::InvalidArgument(format!(
                "unknown input '{extra}'"
            )));
        }

        let outputs = self.run(positional)?;
        Ok(self.output_names().into_iter().zip(outputs).collect())
    }

    /// Submits a run to the blocking pool and awaits its result.
    pub async fn run_async(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, RuntimeError> {
        let engine = Arc::clone(self.engine.as_ref().expect("engine exists in Ready"));
        let graph = Arc::clone(self.graph_shared.as_ref().expect("graph exists in Ready"));
        tokio::task::spawn_blocking(move || engine.run(&graph, inputs))
            .await
            .map_err(|e| RuntimeError::Execution {
                node: "run_async".into(),
                source: OpError::Execution {
                    op: "run_async",
                    detail: format!("blocking task failed: {e}"),
                },
            })?
    }

    /// Runs once with zero-filled inputs and per-node timing.
    pub fn profile(&self) -> Result<ProfilingResult, RuntimeError> {
        let graph = self.graph_ref();
        let mut inputs = Vec::with_capacity(graph.inputs().len());
        for &input in graph.inputs() {
            let value = graph.value(input);
            let shape = value.effective_shape().cloned().ok_or_else(|| {
                RuntimeError::InvalidArgument(format!(
                    "input '{}' has no concrete shape for profiling",
                    value.name.as_deref().unwrap_or("<unnamed>")
                ))
            })?;
            inputs.push(Tensor::new(shape, value.effective_dtype(), value.device)?);
        }
        let (_, profile) = self.engine().run_with_profile(graph, inputs)?;
        Ok(profile)
    }

    /// Runs per-node profiling over caller-supplied inputs.
    pub fn run_with_profile(
        &self,
        inputs: Vec<Tensor>,
    ) -> Result<(Vec<Tensor>, ProfilingResult), RuntimeError> {
        self.engine().run_with_profile(self.graph_ref(), inputs)
    }

    /// Runs the graph once per batch entry, sequentially.
    pub fn run_batch(
        &self,
        batch: Vec<Vec<Tensor>>,
    ) -> Result<Vec<Vec<Tensor>>, RuntimeError> {
        self.engine().run_batch(self.graph_ref(), batch)
    }

    /// Concatenates the batch along the leading dim, runs once, and
    /// splits the outputs back.
    pub fn run_batch_merged(
        &self,
        batch: Vec<Vec<Tensor>>,
    ) -> Result<Vec<Vec<Tensor>>, RuntimeError> {
        self.engine().run_batch_merged(self.graph_ref(), batch)
    }

    /// Returns the memory plan computed during preparation.
    pub fn memory_plan(&self) -> &MemoryPlan {
        self.plan.as_ref().expect("plan exists in Ready")
    }

    /// Host pool statistics snapshot.
    pub fn pool_stats(&self) -> memory_manager::PoolStats {
        memory_manager::device_pool(memory_manager::DeviceKind::Cpu).stats()
    }

    fn engine(&self) -> &Engine {
        self.engine.as_ref().expect("engine exists in Ready")
    }
}

// ── Shared introspection ───────────────────────────────────────

impl<S: ModelBearing> Session<S> {
    fn graph_ref(&self) -> &Graph {
        if let Some(graph) = &self.graph {
            graph
        } else {
            self.graph_shared
                .as_ref()
                .expect("model-bearing state holds a graph")
        }
    }

    /// The loaded graph.
    pub fn graph(&self) -> &Graph {
        self.graph_ref()
    }

    /// Graph-input names, in declaration order. Unnamed inputs get
    /// positional fallbacks (`input_0`, `input_1`, ...).
    pub fn input_names(&self) -> Vec<String> {
        let graph = self.graph_ref();
        graph
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                graph
                    .value(id)
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("input_{i}"))
            })
            .collect()
    }

    /// Graph-output names, in declaration order, with positional
    /// fallbacks (`output_0`, ...).
    pub fn output_names(&self) -> Vec<String> {
        let graph = self.graph_ref();
        graph
            .outputs()
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                graph
                    .value(id)
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("output_{i}"))
            })
            .collect()
    }

    /// Declared or inferred input shapes; `None` where unknown.
    pub fn input_shapes(&self) -> Vec<Option<Shape>> {
        let graph = self.graph_ref();
        graph
            .inputs()
            .iter()
            .map(|&id| graph.value(id).effective_shape().cloned())
            .collect()
    }

    /// Inferred output shapes; `None` where inference could not
    /// resolve them.
    pub fn output_shapes(&self) -> Vec<Option<Shape>> {
        let graph = self.graph_ref();
        graph
            .outputs()
            .iter()
            .map(|&id| graph.value(id).effective_shape().cloned())
            .collect()
    }

    /// Allocates a zero-filled tensor matching input `index`.
    pub fn create_input_tensor(&self, index: usize) -> Result<Tensor, RuntimeError> {
        let graph = self.graph_ref();
        let &value_id = graph.inputs().get(index).ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("input index {index} out of range"))
        })?;
        let value = graph.value(value_id);
        let shape = value.effective_shape().cloned().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("input {index} has no concrete shape"))
        })?;
        Tensor::new(shape, value.effective_dtype(), value.device).map_err(RuntimeError::from)
    }

    /// Allocates a zero-filled tensor matching the named input.
    pub fn create_input_tensor_by_name(&self, name: &str) -> Result<Tensor, RuntimeError> {
        let index = self
            .input_names()
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RuntimeError::NotFound(format!("no input named '{name}'")))?;
        self.create_input_tensor(index)
    }

    /// The session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<S: SessionState> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &std::any::type_name::<S>())
            .field("providers", &self.providers.len())
            .field("has_graph", &(self.graph.is_some() || self.graph_shared.is_some()))
            .field("has_plan", &self.plan.is_some())
            .field("has_engine", &self.engine.is_some())
            .finish()
    }
}
