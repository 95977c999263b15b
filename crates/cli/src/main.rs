// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `barrage` binary: parse arguments, build the config, run the agent.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod args;
mod config_builder;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use barrage_core::cancellation::Cancellation;
use barrage_daemon::signal::install_signal_handlers;
use barrage_daemon::startup::{init_logging, run_serve};

use crate::args::{Cli, Command};
use crate::config_builder::build_config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command(), Command::Version) {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let exit_code = runtime.block_on(async {
        let logging = init_logging(&config);
        let cancellation = Arc::new(Cancellation::new());
        let signals = install_signal_handlers(cancellation.clone());

        let result = run_serve(config, cancellation, logging).await;
        signals.abort();
        match result {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("agent execution failure: {e}");
                1
            }
        }
    });

    ExitCode::from(exit_code.clamp(0, 255) as u8)
}
