// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `infer-rt benchmark`: wall-time a list of models.

use runtime::{Session, SessionOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub async fn execute(
    list: PathBuf,
    iterations: usize,
    options: SessionOptions,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              infer-rt · Benchmark Suite             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let content = std::fs::read_to_string(&list)
        .map_err(|e| anyhow::anyhow!("cannot read list '{}': {e}", list.display()))?;
    let models: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    if models.is_empty() {
        anyhow::bail!("list '{}' names no models", list.display());
    }

    println!(
        "  {:<40} {:>10} {:>10} {:>10}",
        "Model", "Load (ms)", "Avg (ms)", "Best (ms)",
    );
    println!("  {}", "-".repeat(74));

    for path in models {
        match bench_one(Path::new(path), iterations, options.clone()) {
            Ok((load_ms, avg_ms, best_ms)) => {
                println!("  {path:<40} {load_ms:>10.2} {avg_ms:>10.3} {best_ms:>10.3}");
            }
            Err(e) => {
                println!("  {path:<40} FAILED: {e}");
            }
        }
    }
    Ok(())
}

fn bench_one(
    model: &Path,
    iterations: usize,
    options: SessionOptions,
) -> anyhow::Result<(f64, f64, f64)> {
    let load_started = Instant::now();
    let session = Session::create(options)?
        .load_model(model)?
        .prepare()?
        .ready()?;
    let load_ms = load_started.elapsed().as_secs_f64() * 1000.0;

    let make_inputs = || -> anyhow::Result<Vec<tensor_core::Tensor>> {
        (0..session.input_names().len())
            .map(|i| session.create_input_tensor(i).map_err(Into::into))
            .collect()
    };

    // Warmup.
    session.run(make_inputs()?)?;

    let mut total = 0.0;
    let mut best = f64::MAX;
    for _ in 0..iterations.max(1) {
        let inputs = make_inputs()?;
        let started = Instant::now();
        session.run(inputs)?;
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        total += ms;
        best = best.min(ms);
    }
    Ok((load_ms, total / iterations.max(1) as f64, best))
}
