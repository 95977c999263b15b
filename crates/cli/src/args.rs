// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface of the agent.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Load-testing agent: registers with the control plane and executes the
/// tests dispatched to it.
#[derive(Debug, Parser)]
#[command(name = "barrage", version, about)]
pub struct Cli {
    /// Path to the agent config file (YAML).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Folder (tenant) id the agent belongs to.
    #[arg(long)]
    pub folder_id: Option<String>,

    /// Unique name of a persistent agent.
    #[arg(long)]
    pub agent_name: Option<String>,

    /// Don't reuse the cached agent id.
    #[arg(long)]
    pub no_cache: bool,

    /// Path to the agent working directory.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Path to the generator lock directory.
    #[arg(long)]
    pub lock_dir: Option<PathBuf>,

    /// Runtime environment feature switch.
    #[arg(long)]
    pub environment: Option<String>,

    /// Transport factory to talk to the control plane with.
    #[arg(long)]
    pub transport: Option<String>,

    /// Write agent logs to this file or directory.
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Extra labels attached to shipped logs, as key=value.
    #[arg(long = "label", value_name = "KEY=VALUE")]
    pub labels: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run as a service: register, poll for tests and execute them.
    Serve,
    /// Execute a single test and exit with its status code.
    Run {
        /// Id of the test to execute.
        test_id: String,
    },
    /// Print the agent version.
    Version,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
