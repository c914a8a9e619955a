// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `infer-rt info`: display graph structure and memory estimates.

use crate::commands::truncate;
use graph_ir::Graph;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub async fn execute(model: PathBuf, dot: bool) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              infer-rt · Model Inspector             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let text = std::fs::read_to_string(&model)
        .map_err(|e| anyhow::anyhow!("cannot read '{}': {e}", model.display()))?;
    let graph = Graph::from_text(&text)
        .map_err(|e| anyhow::anyhow!("cannot parse '{}': {e}", model.display()))?;

    // ── Summary ────────────────────────────────────────────────
    let initializer_bytes: usize = graph
        .iter_values()
        .filter(|v| v.is_initializer())
        .filter_map(|v| v.tensor.as_ref())
        .map(|t| t.size_bytes())
        .sum();

    println!("  Model: {}", model.display());
    println!("  Nodes: {}", graph.node_count());
    println!("  Values: {}", graph.value_count());
    println!("  Inputs: {}", graph.inputs().len());
    println!("  Outputs: {}", graph.outputs().len());
    println!(
        "  Initializer data: {:.2} MB",
        initializer_bytes as f64 / (1024.0 * 1024.0),
    );
    println!();

    // ── Per-op counts ──────────────────────────────────────────
    let mut op_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in graph.iter_nodes() {
        *op_counts.entry(node.op_type.as_str()).or_default() += 1;
    }
    println!("  {:<24} {:>6}", "Op type", "Count");
    println!("  {}", "-".repeat(32));
    for (op, count) in &op_counts {
        println!("  {op:<24} {count:>6}");
    }
    println!();

    // ── Per-node detail ────────────────────────────────────────
    println!(
        "  {:<4} {:<24} {:<20} {:>4} {:>4}",
        "Id", "Name", "Op", "In", "Out",
    );
    println!("  {}", "-".repeat(62));
    for node in graph.iter_nodes() {
        println!(
            "  {:<4} {:<24} {:<20} {:>4} {:>4}",
            node.id().index(),
            truncate(node.display_name(), 24),
            truncate(&node.op_type, 20),
            node.inputs().len(),
            node.outputs().len(),
        );
    }

    if dot {
        println!();
        println!("{}", graph.to_dot());
    }
    Ok(())
}
