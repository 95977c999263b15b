// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane, telemetry, logging and object-store client contracts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use barrage_core::agent::AgentInfo;
use barrage_core::error::{BackendError, ObjectStorageError};

use crate::generator::{MonitoringChunk, TrailItem};

/// A service together with the name it is reported under.
#[derive(Debug, Clone)]
pub struct NamedService<T> {
    pub name: String,
    pub service: T,
}

impl<T> NamedService<T> {
    pub fn new(name: impl Into<String>, service: T) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }
}

/// Reference to an object in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub bucket: String,
    pub key: String,
}

/// Log severity as the logging backend understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

/// One log record in transport form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    pub labels: BTreeMap<String, String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// One test-data payload of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDataEntry {
    pub name: String,
    #[serde(default)]
    pub is_transient: bool,
    #[serde(default)]
    pub storage_object: Option<StorageObject>,
}

/// Artifact upload settings as sent by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactUploadSettings {
    #[serde(default)]
    pub output_bucket: String,
    #[serde(default)]
    pub output_name: String,
    #[serde(default)]
    pub is_archive: bool,
    #[serde(default)]
    pub filter_include: Vec<String>,
    #[serde(default)]
    pub filter_exclude: Vec<String>,
}

/// A job as dispatched by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: String,
    /// Job config as a JSON document.
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub logging_log_group_id: Option<String>,
    #[serde(default)]
    pub data_payload: Vec<TestDataEntry>,
    #[serde(default)]
    pub artifact_upload_settings: Option<ArtifactUploadSettings>,
}

/// Signal the control plane sends for a running job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSignal {
    Unspecified,
    Wait,
    RunIn { seconds: f64 },
    Stop,
    /// Forward-compatibility escape hatch; treated as a protocol error.
    Other(String),
}

/// Registration operations.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Register a provider-created agent using its compute metadata.
    async fn register_agent(&self) -> Result<String, BackendError>;

    /// Register a persistent external agent.
    async fn register_external_agent(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<String, BackendError>;
}

/// The job-facing control-plane surface.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Fetch a specific job, or any pending job when `job_id` is `None`.
    /// `Ok(None)` means "nothing pending".
    async fn get_job(&self, job_id: Option<&str>) -> Result<Option<JobMessage>, BackendError>;

    async fn get_job_signal(&self, job_id: &str) -> Result<JobSignal, BackendError>;

    async fn claim_tank_status(
        &self,
        status: &str,
        status_message: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn claim_job_status(
        &self,
        job_id: &str,
        status: &str,
        error: Option<&str>,
        error_type: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn download_transient_ammo(
        &self,
        job_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<(), BackendError>;

    async fn report_event_logs(
        &self,
        idempotency_key: &str,
        events: &[LogMessage],
    ) -> Result<(), BackendError>;
}

/// Live metrics upload surface.
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    async fn send_trails(&self, job_id: &str, trails: &[TrailItem]) -> Result<(), BackendError>;

    async fn send_monitorings(
        &self,
        job_id: &str,
        chunks: &[MonitoringChunk],
    ) -> Result<(), BackendError>;

    /// Record the detected breaking point of an autostopped test.
    async fn set_imbalance_and_dsc(
        &self,
        job_id: &str,
        rps: u64,
        timestamp: i64,
        comment: &str,
    ) -> Result<(), BackendError>;
}

/// Remote log-group shipping.
#[async_trait]
pub trait LogClient: Send + Sync {
    async fn send_log(
        &self,
        log_group_id: &str,
        messages: &[LogMessage],
        resource_type: &str,
        resource_id: &str,
    ) -> Result<(), BackendError>;
}

/// Object store download/upload.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn download(
        &self,
        object: &StorageObject,
        path: &Path,
    ) -> Result<(), ObjectStorageError>;

    async fn upload(
        &self,
        source: &Path,
        key: &str,
        bucket: &str,
    ) -> Result<(), ObjectStorageError>;
}

/// Builds every client of one transport.
pub trait ClientFactory: Send + Sync {
    fn create_agent_client(&self) -> Arc<dyn AgentClient>;
    fn create_backend_client(&self, agent: &AgentInfo) -> Arc<dyn BackendClient>;
    fn create_telemetry_client(&self, agent: &AgentInfo) -> Arc<dyn TelemetryClient>;
    fn create_storage_client(&self) -> Arc<dyn StorageClient>;
    fn create_log_client(&self) -> Arc<dyn LogClient>;
    fn create_events_log_client(&self, agent: &AgentInfo) -> Arc<dyn LogClient>;
}
