// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `infer-rt run`: execute a model on zero-filled inputs.

use runtime::{SchedulerKind, Session, SessionOptions};
use std::path::PathBuf;

pub async fn execute(
    model: PathBuf,
    scheduler: String,
    num_threads: usize,
    mut options: SessionOptions,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             infer-rt · Inference Runner             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    options.scheduler = match scheduler.to_lowercase().as_str() {
        "topological" | "topo" => SchedulerKind::Topological,
        "pipeline" => SchedulerKind::Pipeline,
        "parallel" => SchedulerKind::Parallel,
        other => anyhow::bail!(
            "unknown scheduler '{other}'; expected 'topological', 'pipeline', or 'parallel'"
        ),
    };
    options.num_threads = num_threads;

    println!("  Model:     {}", model.display());
    println!("  Scheduler: {scheduler}");
    println!();

    println!("  [1/3] Loading and optimizing...");
    let session = Session::create(options)?
        .load_model(&model)
        .map_err(|e| anyhow::anyhow!("failed to load '{}': {e}", model.display()))?;

    let input_names = session.input_names();
    println!("        inputs:  {input_names:?}");
    println!("        outputs: {:?}", session.output_names());

    println!("  [2/3] Preparing (memory plan, kernel compile)...");
    let session = session.prepare()?.ready()?;

    println!("  [3/3] Running with zero-filled inputs...");
    let mut inputs = Vec::new();
    for (i, name) in input_names.iter().enumerate() {
        let tensor = session.create_input_tensor(i).map_err(|e| {
            anyhow::anyhow!("cannot synthesise input '{name}': {e}")
        })?;
        inputs.push(tensor);
    }

    let outputs = session.run_async(inputs).await?;
    println!();
    for (name, tensor) in session.output_names().iter().zip(&outputs) {
        print!("  {name}: shape {}, dtype {}", tensor.shape(), tensor.dtype());
        if tensor.dtype() == tensor_core::DType::F32 {
            let head = tensor.as_f32().iter().take(8).collect::<Vec<_>>();
            print!(", head {head:?}");
        }
        println!();
    }
    println!();
    println!("  {}", session.pool_stats().summary());
    Ok(())
}
