// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Session configuration, loadable from TOML or built programmatically.
//!
//! # TOML Format
//! ```toml
//! execution_providers = ["cpu"]
//! device_id = 0
//! optimization_level = "all"
//! enable_operator_fusion = true
//! scheduler = "parallel"
//! num_threads = 0
//! enable_profiling = false
//! memory_pool_size = 0
//! ```

use crate::RuntimeError;
use std::path::Path;

/// How aggressively the optimizer pipeline rewrites the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// No rewrites.
    None,
    /// Constant folding and dead-code elimination.
    Basic,
    /// Adds operator fusion and identity simplification.
    Extended,
    /// Adds memory-layout assignment.
    All,
}

/// Which scheduling policy drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Topological,
    Pipeline,
    Parallel,
}

/// Configuration for an inference session.
///
/// Fields omitted from a TOML file fall back to the defaults.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Provider names in priority order. The CPU provider is appended
    /// automatically when absent, as the universal fallback.
    pub execution_providers: Vec<String>,
    /// Device ordinal for multi-device providers.
    pub device_id: usize,
    /// Optimizer pipeline selection.
    pub optimization_level: OptimizationLevel,
    /// Whether the fusion pass runs (at `Extended` and above).
    pub enable_operator_fusion: bool,
    /// Scheduling policy.
    pub scheduler: SchedulerKind,
    /// Pipeline stage count (pipeline scheduler only).
    pub pipeline_stages: usize,
    /// Worker threads; 0 selects the hardware concurrency.
    pub num_threads: usize,
    /// Record per-node timings on every run.
    pub enable_profiling: bool,
    /// Soft cap for the host memory pool in bytes; 0 is unlimited.
    pub memory_pool_size: usize,
}

impl SessionOptions {
    /// Loads options from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses options from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, RuntimeError> {
        toml::from_str(text).map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises options to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves `num_threads`, mapping 0 to the hardware concurrency.
    pub fn resolve_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            execution_providers: vec!["cpu".to_string()],
            device_id: 0,
            optimization_level: OptimizationLevel::All,
            enable_operator_fusion: true,
            scheduler: SchedulerKind::Topological,
            pipeline_stages: 4,
            num_threads: 0,
            enable_profiling: false,
            memory_pool_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let o = SessionOptions::default();
        assert_eq!(o.execution_providers, vec!["cpu"]);
        assert_eq!(o.optimization_level, OptimizationLevel::All);
        assert!(o.enable_operator_fusion);
        assert_eq!(o.scheduler, SchedulerKind::Topological);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
execution_providers = ["cpu"]
device_id = 0
optimization_level = "basic"
enable_operator_fusion = false
scheduler = "parallel"
pipeline_stages = 2
num_threads = 8
enable_profiling = true
memory_pool_size = 1048576
"#;
        let o = SessionOptions::from_toml(toml).unwrap();
        assert_eq!(o.optimization_level, OptimizationLevel::Basic);
        assert!(!o.enable_operator_fusion);
        assert_eq!(o.scheduler, SchedulerKind::Parallel);
        assert_eq!(o.num_threads, 8);
        assert_eq!(o.memory_pool_size, 1048576);
    }

    #[test]
    fn test_toml_roundtrip() {
        let o = SessionOptions {
            scheduler: SchedulerKind::Pipeline,
            optimization_level: OptimizationLevel::Extended,
            ..Default::default()
        };
        let back = SessionOptions::from_toml(&o.to_toml().unwrap()).unwrap();
        assert_eq!(back.scheduler, SchedulerKind::Pipeline);
        assert_eq!(back.optimization_level, OptimizationLevel::Extended);
    }

    #[test]
    fn test_resolve_threads() {
        let auto = SessionOptions {
            num_threads: 0,
            ..Default::default()
        };
        assert!(auto.resolve_threads() >= 1);

        let fixed = SessionOptions {
            num_threads: 3,
            ..Default::default()
        };
        assert_eq!(fixed.resolve_threads(), 3);
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(SessionOptions::from_toml("scheduler = \"warp\"").is_err());
    }
}
