// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # optimizer
//!
//! Graph rewrite passes and the dependency-ordered pass manager.
//!
//! This crate provides:
//! - [`Pass`] — name, declared dependencies, repeatability, and the
//!   rewrite itself.
//! - [`PassManager`] — Kahn-orders passes by dependencies, runs each on
//!   a clone and commits atomically, re-running repeatable passes to a
//!   fixed point.
//! - The pass catalogue: [`ConstantFolding`], [`DeadCodeElimination`],
//!   [`OperatorFusion`], [`MemoryLayoutOptimization`], and
//!   [`SubgraphReplacement`].
//!
//! Pass selection by optimisation level lives in the session
//! (`runtime`); this crate only provides the machinery.

mod dce;
mod error;
mod folding;
mod fusion;
mod layout;
mod pass;
mod subgraph;

pub use dce::DeadCodeElimination;
pub use error::OptimizerError;
pub use folding::ConstantFolding;
pub use fusion::OperatorFusion;
pub use layout::MemoryLayoutOptimization;
pub use pass::{Pass, PassManager};
pub use subgraph::SubgraphReplacement;
