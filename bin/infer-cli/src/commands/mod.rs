// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CLI subcommand implementations.

pub mod benchmark;
pub mod info;
pub mod profile;
pub mod run;

use runtime::SessionOptions;
use std::path::Path;

/// Initialises tracing from the `-v` count: warn by default, then
/// info, debug, trace.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads session options from `--config`, or the defaults.
pub fn load_options(config: Option<&Path>) -> anyhow::Result<SessionOptions> {
    match config {
        Some(path) => SessionOptions::from_file(path)
            .map_err(|e| anyhow::anyhow!("cannot load config: {e}")),
        None => Ok(SessionOptions::default()),
    }
}

/// Truncates a string for column display.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max.saturating_sub(1)])
    }
}
