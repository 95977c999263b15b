// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interval-driven background worker with an owned stop signal.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A task running `iteration` every `interval` until stopped.
///
/// The iteration runs once immediately; the wait between runs is
/// interruptible so `stop()` returns promptly.
pub struct BackgroundWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundWorker {
    pub fn spawn<F, Fut>(interval: Duration, mut iteration: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                iteration().await;
                tokio::select! {
                    _ = worker_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        Self { token, handle }
    }

    /// Token cancelled when the worker is asked to stop; iterations may use
    /// it to abort long waits early.
    pub fn stop_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal the worker and wait for the current iteration to finish.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
