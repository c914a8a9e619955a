// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The pass contract and the dependency-ordered pass manager.
//!
//! Passes run on a **clone** of the graph; the manager swaps the clone
//! in only when the pass succeeds and the result still validates. A
//! failing pass therefore never leaves a half-rewritten graph behind —
//! the whole optimisation aborts instead, which the session treats as a
//! load failure.

use crate::OptimizerError;
use graph_ir::Graph;
use std::collections::VecDeque;

/// Re-run ceiling for repeatable passes that fail to reach a fixed
/// point on their own.
const FIXPOINT_LIMIT: usize = 10;

/// One rewrite over the graph.
pub trait Pass: Send + Sync {
    /// Stable pass name, used for dependency declarations.
    fn name(&self) -> &'static str;

    /// Names of passes that must run before this one. Dependencies on
    /// unregistered passes are ignored.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Repeatable passes are re-run until they report no change.
    fn repeatable(&self) -> bool {
        false
    }

    /// Applies the rewrite. Returns `true` if the graph changed.
    fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError>;
}

/// Owns the registered passes and runs them in dependency order.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pass. Registration order breaks ordering ties.
    pub fn register(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Returns the registered pass names in registration order.
    pub fn registered_passes(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every registered pass once, in dependency order, re-running
    /// repeatable passes to a fixed point.
    pub fn optimize(&self, graph: &mut Graph) -> Result<(), OptimizerError> {
        for index in self.sorted_order() {
            self.run_one(&*self.passes[index], graph)?;
        }
        Ok(())
    }

    /// Runs a single pass by name.
    pub fn run_pass(&self, name: &str, graph: &mut Graph) -> Result<(), OptimizerError> {
        let pass = self
            .passes
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| OptimizerError::PassNotFound(name.to_string()))?;
        self.run_one(&**pass, graph)
    }

    fn run_one(&self, pass: &dyn Pass, graph: &mut Graph) -> Result<(), OptimizerError> {
        let mut rounds = 0;
        loop {
            // Atomic commit: rewrite a clone, swap only on success.
            let mut candidate = graph.clone();
            let changed = pass.run(&mut candidate)?;
            if changed {
                candidate
                    .validate()
                    .map_err(|source| OptimizerError::InvalidResult {
                        pass: pass.name(),
                        source,
                    })?;
                *graph = candidate;
            }
            rounds += 1;
            tracing::debug!("pass '{}' round {rounds}: changed={changed}", pass.name());
            if !changed || !pass.repeatable() || rounds >= FIXPOINT_LIMIT {
                return Ok(());
            }
        }
    }

    /// Kahn-ordered pass indices, ties broken by registration order.
    fn sorted_order(&self) -> Vec<usize> {
        let names: Vec<&str> = self.passes.iter().map(|p| p.name()).collect();
        let index_of = |name: &str| names.iter().position(|&n| n == name);

        let mut in_degree = vec![0usize; self.passes.len()];
        for (i, pass) in self.passes.iter().enumerate() {
            for dep in pass.dependencies() {
                if index_of(dep).is_some() {
                    in_degree[i] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..self.passes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.passes.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for (j, pass) in self.passes.iter().enumerate() {
                if pass
                    .dependencies()
                    .iter()
                    .any(|&dep| dep == self.passes[i].name())
                {
                    in_degree[j] -= 1;
                    if in_degree[j] == 0 {
                        queue.push_back(j);
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tensor_core::Shape;

    fn tiny_graph() -> Graph {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        g.value_mut(x).shape = Some(Shape::vector(1));
        let y = g.add_value();
        let relu = g.add_node("Relu", None);
        g.connect_input(relu, x);
        g.connect_output(relu, y);
        g.add_input(x);
        g.add_output(y);
        g
    }

    struct Recording {
        name: &'static str,
        deps: &'static [&'static str],
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Pass for Recording {
        fn name(&self) -> &'static str {
            self.name
        }
        fn dependencies(&self) -> &'static [&'static str] {
            self.deps
        }
        fn run(&self, _graph: &mut Graph) -> Result<bool, OptimizerError> {
            self.log.lock().unwrap().push(self.name);
            Ok(false)
        }
    }

    #[test]
    fn test_dependency_ordering() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = PassManager::new();
        // Registered out of order; dependencies must still win.
        manager.register(Box::new(Recording {
            name: "late",
            deps: &["early"],
            log: Arc::clone(&log),
        }));
        manager.register(Box::new(Recording {
            name: "early",
            deps: &[],
            log: Arc::clone(&log),
        }));

        manager.optimize(&mut tiny_graph()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn test_missing_dependency_ignored() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = PassManager::new();
        manager.register(Box::new(Recording {
            name: "solo",
            deps: &["not-registered"],
            log: Arc::clone(&log),
        }));
        manager.optimize(&mut tiny_graph()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["solo"]);
    }

    struct CountedRepeat {
        counter: Arc<AtomicUsize>,
        changes: usize,
    }

    impl Pass for CountedRepeat {
        fn name(&self) -> &'static str {
            "counted"
        }
        fn repeatable(&self) -> bool {
            true
        }
        fn run(&self, _graph: &mut Graph) -> Result<bool, OptimizerError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(n < self.changes)
        }
    }

    #[test]
    fn test_repeatable_runs_to_fixed_point() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut manager = PassManager::new();
        manager.register(Box::new(CountedRepeat {
            counter: Arc::clone(&counter),
            changes: 3,
        }));
        manager.optimize(&mut tiny_graph()).unwrap();
        // 3 changing rounds + 1 quiescent round.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    struct Corrupting;

    impl Pass for Corrupting {
        fn name(&self) -> &'static str {
            "corrupting"
        }
        fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
            // Introduce a cycle: the existing node consumes its own
            // downstream value through a second node.
            let relu = graph.iter_nodes().next().unwrap().id();
            let y = graph.outputs()[0];
            let z = graph.add_value();
            let back = graph.add_node("Relu", None);
            graph.connect_input(back, y);
            graph.connect_output(back, z);
            graph.connect_input(relu, z);
            Ok(true)
        }
    }

    #[test]
    fn test_invalid_result_is_not_committed() {
        let mut manager = PassManager::new();
        manager.register(Box::new(Corrupting));
        let mut graph = tiny_graph();

        let result = manager.optimize(&mut graph);
        assert!(matches!(result, Err(OptimizerError::InvalidResult { .. })));
        // The original graph is untouched.
        assert_eq!(graph.node_count(), 1);
        graph.validate().unwrap();
    }

    struct Failing;

    impl Pass for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn run(&self, graph: &mut Graph) -> Result<bool, OptimizerError> {
            // Mutate the candidate, then fail: nothing must commit.
            let node = graph.iter_nodes().next().unwrap().id();
            graph.remove_node(node);
            Err(OptimizerError::PassNotFound("simulated".into()))
        }
    }

    #[test]
    fn test_error_leaves_graph_untouched() {
        let mut manager = PassManager::new();
        manager.register(Box::new(Failing));
        let mut graph = tiny_graph();
        assert!(manager.optimize(&mut graph).is_err());
        assert_eq!(graph.node_count(), 1);
        graph.validate().unwrap();
    }

    #[test]
    fn test_run_pass_by_name() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = PassManager::new();
        manager.register(Box::new(Recording {
            name: "only",
            deps: &[],
            log: Arc::clone(&log),
        }));
        manager.run_pass("only", &mut tiny_graph()).unwrap();
        assert!(matches!(
            manager.run_pass("absent", &mut tiny_graph()),
            Err(OptimizerError::PassNotFound(_))
        ));
    }
}
