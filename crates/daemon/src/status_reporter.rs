// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background loop claiming the agent's status with the control plane.

use std::sync::Arc;
use std::time::Duration;

use barrage_core::cancellation::{Cancellation, CancellationLevel};
use barrage_core::error::BackendError;
use barrage_core::job_status::TankStatus;
use barrage_core::state::State;
use barrage_core::units::truncate_string;
use barrage_core::worker::BackgroundWorker;

use barrage_adapters::clients::BackendClient;

const STATUS_MESSAGE_LIMIT: usize = 8000;
const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Shown when the backend stops recognizing this agent.
pub const BACKEND_FORGOT_AGENT: &str = "The backend doesn't know this agent: agent has been \
     deleted or account is missing loadtesting.generatorClient role.";

/// Where the reported status comes from (the agent service, which may
/// override it while uploading artifacts).
pub trait TankStatusSource: Send + Sync {
    fn tank_status(&self) -> TankStatus;
}

pub struct StatusReporter {
    backend: Arc<dyn BackendClient>,
    source: Arc<dyn TankStatusSource>,
    state: Arc<State>,
    cancellation: Arc<Cancellation>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        source: Arc<dyn TankStatusSource>,
        state: Arc<State>,
        cancellation: Arc<Cancellation>,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            source,
            state,
            cancellation,
            interval: interval.max(MIN_REPORT_INTERVAL),
        }
    }

    /// Claim one status. An idle tank with active errors reports `ERROR`
    /// with the state summary.
    pub async fn report(
        &self,
        status: Option<TankStatus>,
        status_message: Option<String>,
    ) -> Result<(), BackendError> {
        let mut status = status.unwrap_or_else(|| self.source.tank_status());
        let mut status_message = status_message;
        if status.is_idle() && !self.state.ok() {
            status = TankStatus::Error;
            status_message = Some(self.state.summary_message());
        }
        let truncated = status_message.map(|m| truncate_string(&m, STATUS_MESSAGE_LIMIT, true));
        self.backend
            .claim_tank_status(status.name(), truncated.as_deref())
            .await
    }

    /// Start the background loop; [`StatusReporterGuard::stop`] claims one
    /// final best-effort `STOPPED`.
    pub fn run(self: Arc<Self>) -> StatusReporterGuard {
        let reporter = self.clone();
        let worker = BackgroundWorker::spawn(self.interval, move || {
            let reporter = reporter.clone();
            async move {
                match reporter.report(None, None).await {
                    Ok(()) => {}
                    Err(e) if e.kind.is_rejection() => {
                        tracing::error!(
                            "backend doesn't recognize this agent ({e}); performing shutdown. \
                             If this keeps repeating, delete the agent-id file or run with \
                             --no-cache."
                        );
                        reporter
                            .cancellation
                            .notify(BACKEND_FORGOT_AGENT, CancellationLevel::Forced);
                    }
                    Err(e) => {
                        tracing::warn!("failed to report agent status: {e}");
                    }
                }
            }
        });
        StatusReporterGuard {
            reporter: self,
            worker,
        }
    }
}

pub struct StatusReporterGuard {
    reporter: Arc<StatusReporter>,
    worker: BackgroundWorker,
}

impl StatusReporterGuard {
    pub async fn stop(self) {
        self.worker.stop().await;
        let reason = self.reporter.cancellation.explain();
        if let Err(e) = self
            .reporter
            .report(Some(TankStatus::Stopped), Some(reason))
            .await
        {
            tracing::error!("failed to report STOPPED status: {e}");
        }
    }
}

#[cfg(test)]
#[path = "status_reporter_tests.rs"]
mod tests;
