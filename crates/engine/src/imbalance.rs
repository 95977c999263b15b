// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-run finalizer reporting the autostop breaking point.

use std::sync::Arc;

use barrage_core::collections::BoundedQueue;

use barrage_adapters::clients::TelemetryClient;
use barrage_adapters::generator::ImbalanceEntry;

/// Drains the imbalance queue after a run and reports the latest entry.
pub struct ImbalanceUploader {
    job_id: String,
    queue: Arc<BoundedQueue<ImbalanceEntry>>,
    telemetry: Arc<dyn TelemetryClient>,
}

impl ImbalanceUploader {
    pub fn new(
        job_id: impl Into<String>,
        queue: Arc<BoundedQueue<ImbalanceEntry>>,
        telemetry: Arc<dyn TelemetryClient>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            queue,
            telemetry,
        }
    }

    /// Pick the entry with the greatest timestamp and push it upstream.
    pub async fn run(&self) {
        let mut latest: Option<ImbalanceEntry> = None;
        while let Some(entry) = self.queue.try_pop() {
            let newer = latest
                .as_ref()
                .is_none_or(|current| current.timestamp < entry.timestamp);
            if newer {
                latest = Some(entry);
            }
        }
        let Some(entry) = latest else {
            return;
        };
        tracing::info!(
            job_id = %self.job_id,
            rps = entry.rps,
            timestamp = entry.timestamp,
            "setting imbalance: {}",
            entry.message
        );
        if let Err(e) = self
            .telemetry
            .set_imbalance_and_dsc(&self.job_id, entry.rps, entry.timestamp, &entry.message)
            .await
        {
            tracing::error!(job_id = %self.job_id, "failed to set imbalance: {e}");
        }
    }
}

#[cfg(test)]
#[path = "imbalance_tests.rs"]
mod tests;
