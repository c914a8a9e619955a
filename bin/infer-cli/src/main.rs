// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # infer-rt
//!
//! Command-line interface for the inference runtime.
//!
//! ## Usage
//! ```bash
//! # Run a model on zero-filled inputs and print the outputs
//! infer-rt run --model model.graph.txt --scheduler parallel
//!
//! # Inspect graph structure and memory estimates
//! infer-rt info --model model.graph.txt --dot
//!
//! # Wall-time a list of models
//! infer-rt benchmark --list models.txt --iterations 10
//!
//! # Per-node timing
//! infer-rt profile --model model.graph.txt
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "infer-rt",
    about = "Graph inference runtime with optimizing passes and pluggable providers",
    version,
    author
)]
struct Cli {
    /// Path to a TOML session configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference on a model with zero-filled inputs.
    Run {
        /// Path to the model (internal textual graph form).
        #[arg(short, long)]
        model: std::path::PathBuf,

        /// Scheduler: topological, pipeline, parallel.
        #[arg(short, long, default_value = "topological")]
        scheduler: String,

        /// Worker threads (0 = hardware concurrency).
        #[arg(short = 't', long, default_value_t = 0)]
        num_threads: usize,
    },

    /// Display graph structure, per-op counts, and memory estimates.
    Info {
        /// Path to the model.
        #[arg(short, long)]
        model: std::path::PathBuf,

        /// Also print the Graphviz DOT rendering.
        #[arg(long)]
        dot: bool,
    },

    /// Wall-time every model in a list file (one path per line).
    Benchmark {
        /// Path to the list file.
        #[arg(short, long)]
        list: std::path::PathBuf,

        /// Timed iterations per model.
        #[arg(short, long, default_value_t = 10)]
        iterations: usize,
    },

    /// Per-node timing for one model.
    Profile {
        /// Path to the model.
        #[arg(short, long)]
        model: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    let options = commands::load_options(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            model,
            scheduler,
            num_threads,
        } => commands::run::execute(model, scheduler, num_threads, options).await,
        Commands::Info { model, dot } => commands::info::execute(model, dot).await,
        Commands::Benchmark { list, iterations } => {
            commands::benchmark::execute(list, iterations, options).await
        }
        Commands::Profile { model } => commands::profile::execute(model, options).await,
    }
}
