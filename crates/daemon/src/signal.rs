// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Termination signals: first is graceful, second is forced.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use barrage_core::cancellation::{Cancellation, CancellationLevel};

/// Install SIGINT/SIGTERM handling; the task only ever calls `notify`.
pub fn install_signal_handlers(cancellation: Arc<Cancellation>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("cannot install SIGINT handler: {e}");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("cannot install SIGTERM handler: {e}");
                return;
            }
        };

        let mut received = 0u32;
        loop {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            received += 1;
            match received {
                1 => {
                    tracing::info!("termination signal received, finishing current work");
                    cancellation.notify("termination signal received", CancellationLevel::Graceful);
                }
                2 => {
                    tracing::warn!("second termination signal received, forcing shutdown");
                    cancellation.notify(
                        "second termination signal received",
                        CancellationLevel::Forced,
                    );
                }
                _ => {
                    tracing::warn!("shutdown is already forced, waiting for workers to stop");
                }
            }
        }
    })
}
