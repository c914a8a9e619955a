// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dead-code elimination.

use crate::{OptimizerError, Pass};
use graph_ir::Graph;

/// Removes nodes whose outputs are neither graph outputs nor consumed
/// by any other node, iterating until nothing more dies.
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "DeadCodeElimination"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ConstantFolding"]
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
        let mut changed = false;
        loop {
            let dead: Vec<_> = graph
                .iter_nodes()
                .filter(|node| {
                    node.outputs().iter().all(|&out| {
                        let value = graph.value(out);
                        value.consumers().is_empty() && !graph.outputs().contains(&out)
                    })
                })
                .map(|node| node.id())
                .collect();

            if dead.is_empty() {
                return Ok(changed);
            }
            for id in dead {
                tracing::debug!(
                    "removing dead node {} ({})",
                    id.index(),
                    graph.node(id).op_type
                );
                graph.remove_node(id);
            }
            changed = true;
        }
    }
}
