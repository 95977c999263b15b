// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reporter handlers delivering the generator's data pipe to the backend.

use std::sync::Arc;

use async_trait::async_trait;

use barrage_core::error::ServiceError;
use barrage_core::reporter::ReportHandler;

use barrage_adapters::clients::TelemetryClient;
use barrage_adapters::generator::{MonitoringChunk, TrailItem};

const TRAIL_BATCH_SIZE: usize = 100;
const MONITORING_BATCH_SIZE: usize = 10;

/// Ships per-second aggregates.
pub struct TrailHandler {
    telemetry: Arc<dyn TelemetryClient>,
    job_id: String,
}

impl TrailHandler {
    pub fn new(telemetry: Arc<dyn TelemetryClient>, job_id: impl Into<String>) -> Self {
        Self {
            telemetry,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl ReportHandler<TrailItem> for TrailHandler {
    async fn handle(&self, _request_id: &str, batch: Vec<TrailItem>) -> Result<(), ServiceError> {
        self.telemetry
            .send_trails(&self.job_id, &batch)
            .await
            .map_err(ServiceError::from)
    }

    fn on_error(&self, error: &ServiceError) {
        tracing::warn!(job_id = %self.job_id, "failed to send trails: {error}");
    }

    fn max_batch_size(&self) -> usize {
        TRAIL_BATCH_SIZE
    }
}

/// Ships host monitoring chunks.
pub struct MonitoringHandler {
    telemetry: Arc<dyn TelemetryClient>,
    job_id: String,
}

impl MonitoringHandler {
    pub fn new(telemetry: Arc<dyn TelemetryClient>, job_id: impl Into<String>) -> Self {
        Self {
            telemetry,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl ReportHandler<MonitoringChunk> for MonitoringHandler {
    async fn handle(
        &self,
        _request_id: &str,
        batch: Vec<MonitoringChunk>,
    ) -> Result<(), ServiceError> {
        self.telemetry
            .send_monitorings(&self.job_id, &batch)
            .await
            .map_err(ServiceError::from)
    }

    fn on_error(&self, error: &ServiceError) {
        tracing::warn!(job_id = %self.job_id, "failed to send monitoring data: {error}");
    }

    fn max_batch_size(&self) -> usize {
        MONITORING_BATCH_SIZE
    }
}

#[cfg(test)]
#[path = "pipes_tests.rs"]
mod tests;
