// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution-provider abstraction.
//!
//! A provider bundles a device with kernel creation, graph preparation,
//! and per-node dispatch. The session enumerates providers in caller
//! priority order; the selector assigns each node the first provider
//! that supports its op, falling back to CPU, which must always be
//! available and support the whole baseline kernel set.

use crate::{ExecutionState, RuntimeError};
use graph_ir::{Attributes, Graph, NodeId};
use memory_manager::DeviceKind;
use once_cell::sync::Lazy;
use operators::Operator;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tensor_core::Tensor;

/// One physical (or logical) compute device.
pub trait Device: Send + Sync {
    fn kind(&self) -> DeviceKind;
    fn name(&self) -> &'static str;
    fn id(&self) -> usize;

    /// Copies a host tensor's bytes into a tensor on this device.
    fn copy_from_host(&self, src: &Tensor, dst: &mut Tensor) -> Result<(), RuntimeError>;

    /// Copies a tensor on this device into a host tensor.
    fn copy_to_host(&self, src: &Tensor, dst: &mut Tensor) -> Result<(), RuntimeError>;

    /// Blocks until all queued work on this device has finished.
    fn synchronize(&self) -> Result<(), RuntimeError>;
}

/// A device-and-kernels bundle.
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn device_kind(&self) -> DeviceKind;
    fn is_available(&self) -> bool;
    fn get_device(&self, device_id: usize) -> Arc<dyn Device>;

    /// `true` when this provider has a kernel for `op_type`.
    fn supports_op(&self, op_type: &str) -> bool;

    /// Builds a kernel for `op_type` with the given attributes.
    fn create_kernel(
        &self,
        op_type: &str,
        attrs: &Attributes,
    ) -> Result<Box<dyn Operator>, RuntimeError>;

    /// Provider-specific graph rewrites, applied after the generic
    /// pipeline. The default does nothing.
    fn optimize_graph(&self, _graph: &mut Graph) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Compiles (and caches) the kernel for one node.
    fn compile_node(&self, graph: &Graph, node: NodeId) -> Result<(), RuntimeError>;

    /// Prepares claimed nodes for execution: forces device assignment,
    /// validates kernels, optionally pre-binds outputs. Failures here
    /// surface before the first run.
    fn prepare_execution(&self, graph: &mut Graph) -> Result<(), RuntimeError>;

    /// Values this provider binds itself; the memory planner skips
    /// them. The default claims none.
    fn prebound_values(&self, _graph: &Graph) -> HashSet<graph_ir::ValueId> {
        HashSet::new()
    }

    /// Executes one node against the run state.
    fn execute_node(
        &self,
        graph: &Graph,
        node: NodeId,
        state: &ExecutionState,
    ) -> Result<(), RuntimeError>;
}

// ── Provider registry ──────────────────────────────────────────

type ProviderFactory = fn() -> Arc<dyn ExecutionProvider>;

/// Process-wide provider factories, keyed by name. Read-only after
/// [`init_providers`].
pub struct ProviderRegistry {
    factories: Mutex<HashMap<&'static str, ProviderFactory>>,
}

impl ProviderRegistry {
    /// Instantiates the named provider, or `None` if unregistered.
    pub fn create(&self, name: &str) -> Option<Arc<dyn ExecutionProvider>> {
        let factories = self.factories.lock().expect("registry mutex poisoned");
        factories.get(name).map(|f| f())
    }

    /// Names of registered providers whose `is_available` holds.
    pub fn available_providers(&self) -> Vec<&'static str> {
        let factories = self.factories.lock().expect("registry mutex poisoned");
        let mut names: Vec<&'static str> = factories
            .iter()
            .filter(|(_, f)| f().is_available())
            .map(|(&name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }
}

static PROVIDERS: Lazy<ProviderRegistry> = Lazy::new(|| {
    let mut factories: HashMap<&'static str, ProviderFactory> = HashMap::new();
    factories.insert("cpu", || {
        Arc::new(crate::cpu::CpuExecutionProvider::new()) as Arc<dyn ExecutionProvider>
    });
    ProviderRegistry {
        factories: Mutex::new(factories),
    }
});

/// Returns the shared provider registry.
pub fn provider_registry() -> &'static ProviderRegistry {
    &PROVIDERS
}

/// Forces provider registration. Idempotent; called by the session
/// constructor.
pub fn init_providers() {
    Lazy::force(&PROVIDERS);
}

// ── Selection ──────────────────────────────────────────────────

/// Assigns every node to a provider: the first in priority order whose
/// `supports_op` holds, falling back to the CPU provider. Returns the
/// per-node provider index (by arena slot) and stamps each node's
/// device tag.
///
/// # Errors
/// [`RuntimeError::NotFound`] when no provider supports a node's op.
pub fn assign_providers(
    graph: &mut Graph,
    providers: &[Arc<dyn ExecutionProvider>],
) -> Result<Vec<usize>, RuntimeError> {
    if providers.is_empty() {
        return Err(RuntimeError::NotFound(
            "no execution providers configured".into(),
        ));
    }
    let cpu_index = providers.iter().position(|p| p.device_kind().is_host());

    let node_ids: Vec<NodeId> = graph.iter_nodes().map(|n| n.id()).collect();
    let slots = node_ids.iter().map(|id| id.index()).max().map_or(0, |m| m + 1);
    let mut assignments = vec![usize::MAX; slots];

    for node_id in node_ids {
        let op_type = graph.node(node_id).op_type.clone();
        let chosen = providers
            .iter()
            .position(|p| p.supports_op(&op_type))
            .or(cpu_index.filter(|&i| providers[i].supports_op(&op_type)))
            .ok_or_else(|| {
                RuntimeError::NotFound(format!(
                    "no execution provider supports operator '{op_type}'"
                ))
            })?;
        assignments[node_id.index()] = chosen;
        graph.node_mut(node_id).device = providers[chosen].device_kind();
    }
    Ok(assignments)
}
