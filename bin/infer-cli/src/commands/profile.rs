// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `infer-rt profile`: per-node timing for one model.

use crate::commands::truncate;
use runtime::{Session, SessionOptions};
use std::path::PathBuf;

pub async fn execute(model: PathBuf, mut options: SessionOptions) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               infer-rt · Node Profiler              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    options.enable_profiling = true;
    let session = Session::create(options)?
        .load_model(&model)
        .map_err(|e| anyhow::anyhow!("failed to load '{}': {e}", model.display()))?
        .prepare()?
        .ready()?;

    let result = session.profile()?;

    println!(
        "  {:<28} {:<20} {:>10} {:>12}",
        "Node", "Op", "Time (ms)", "Output (KB)",
    );
    println!("  {}", "-".repeat(74));
    for profile in &result.node_profiles {
        println!(
            "  {:<28} {:<20} {:>10.4} {:>12.2}",
            truncate(&profile.name, 28),
            truncate(&profile.op_type, 20),
            profile.time_ms,
            profile.bytes as f64 / 1024.0,
        );
    }
    println!("  {}", "-".repeat(74));
    println!("  {}", result.summary());
    println!();

    println!("  Hottest nodes:");
    for profile in result.hottest(5) {
        println!("   {:>8.4} ms  {}", profile.time_ms, profile.name);
    }
    println!();
    println!("  {}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
