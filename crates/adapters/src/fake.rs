// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory implementations of every adapter trait.
//!
//! Tests enqueue responses (`push_job`, `push_signal`, failure injection) and
//! assert on the recorded calls afterwards. Unscripted calls take the benign
//! default: no job, no signal, successful claims.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use barrage_core::agent::AgentInfo;
use barrage_core::collections::BoundedQueue;
use barrage_core::error::{BackendError, GeneratorError, ObjectStorageError};

use crate::clients::{
    AgentClient, BackendClient, ClientFactory, JobMessage, JobSignal, LogClient, LogMessage,
    StorageClient, StorageObject, TelemetryClient,
};
use crate::generator::{
    GeneratorAdapter, GeneratorPipes, GeneratorSpec, GeneratorWorker, ImbalanceEntry,
    MonitoringChunk, TrailItem, WorkerState,
};

/// A recorded `claim_job_status` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobClaim {
    pub job_id: String,
    pub status: String,
    pub error: Option<String>,
    pub error_type: Option<String>,
}

#[derive(Default)]
struct FakeBackendInner {
    jobs: VecDeque<Result<Option<JobMessage>, BackendError>>,
    signals: VecDeque<Result<JobSignal, BackendError>>,
    claim_job_results: VecDeque<Result<(), BackendError>>,
    claim_tank_results: VecDeque<Result<(), BackendError>>,
    job_claims: Vec<JobClaim>,
    tank_claims: Vec<(String, Option<String>)>,
    downloads: Vec<(String, String, PathBuf)>,
    events: Vec<(String, Vec<LogMessage>)>,
}

/// Scripted control-plane client.
#[derive(Default)]
pub struct FakeBackend {
    inner: Mutex<FakeBackendInner>,
}

impl FakeBackend {
    pub fn push_job(&self, job: Result<Option<JobMessage>, BackendError>) {
        self.inner.lock().jobs.push_back(job);
    }

    pub fn push_signal(&self, signal: Result<JobSignal, BackendError>) {
        self.inner.lock().signals.push_back(signal);
    }

    pub fn push_claim_job_result(&self, result: Result<(), BackendError>) {
        self.inner.lock().claim_job_results.push_back(result);
    }

    pub fn push_claim_tank_result(&self, result: Result<(), BackendError>) {
        self.inner.lock().claim_tank_results.push_back(result);
    }

    pub fn job_claims(&self) -> Vec<JobClaim> {
        self.inner.lock().job_claims.clone()
    }

    pub fn tank_claims(&self) -> Vec<(String, Option<String>)> {
        self.inner.lock().tank_claims.clone()
    }

    pub fn downloads(&self) -> Vec<(String, String, PathBuf)> {
        self.inner.lock().downloads.clone()
    }

    pub fn events(&self) -> Vec<(String, Vec<LogMessage>)> {
        self.inner.lock().events.clone()
    }

    pub fn pending_signals(&self) -> usize {
        self.inner.lock().signals.len()
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn get_job(&self, _job_id: Option<&str>) -> Result<Option<JobMessage>, BackendError> {
        self.inner.lock().jobs.pop_front().unwrap_or(Ok(None))
    }

    async fn get_job_signal(&self, _job_id: &str) -> Result<JobSignal, BackendError> {
        self.inner
            .lock()
            .signals
            .pop_front()
            .unwrap_or(Ok(JobSignal::Unspecified))
    }

    async fn claim_tank_status(
        &self,
        status: &str,
        status_message: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner
            .tank_claims
            .push((status.to_string(), status_message.map(str::to_string)));
        inner.claim_tank_results.pop_front().unwrap_or(Ok(()))
    }

    async fn claim_job_status(
        &self,
        job_id: &str,
        status: &str,
        error: Option<&str>,
        error_type: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.job_claims.push(JobClaim {
            job_id: job_id.to_string(),
            status: status.to_string(),
            error: error.map(str::to_string),
            error_type: error_type.map(str::to_string),
        });
        inner.claim_job_results.pop_front().unwrap_or(Ok(()))
    }

    async fn download_transient_ammo(
        &self,
        job_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::internal(e.to_string()))?;
        }
        std::fs::write(path, b"transient ammo")
            .map_err(|e| BackendError::internal(e.to_string()))?;
        self.inner
            .lock()
            .downloads
            .push((job_id.to_string(), name.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn report_event_logs(
        &self,
        idempotency_key: &str,
        events: &[LogMessage],
    ) -> Result<(), BackendError> {
        self.inner
            .lock()
            .events
            .push((idempotency_key.to_string(), events.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeAgentClientInner {
    register_results: VecDeque<Result<String, BackendError>>,
    register_calls: Vec<String>,
}

/// Scripted registration client.
#[derive(Default)]
pub struct FakeAgentClient {
    inner: Mutex<FakeAgentClientInner>,
}

impl FakeAgentClient {
    pub fn push_register_result(&self, result: Result<String, BackendError>) {
        self.inner.lock().register_results.push_back(result);
    }

    /// The operations invoked, in order (`"register_agent"` or
    /// `"register_external_agent folder name"`).
    pub fn register_calls(&self) -> Vec<String> {
        self.inner.lock().register_calls.clone()
    }
}

#[async_trait]
impl AgentClient for FakeAgentClient {
    async fn register_agent(&self) -> Result<String, BackendError> {
        let mut inner = self.inner.lock();
        inner.register_calls.push("register_agent".to_string());
        inner
            .register_results
            .pop_front()
            .unwrap_or_else(|| Ok("agent-id".to_string()))
    }

    async fn register_external_agent(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<String, BackendError> {
        let mut inner = self.inner.lock();
        inner
            .register_calls
            .push(format!("register_external_agent {folder_id} {name}"));
        inner
            .register_results
            .pop_front()
            .unwrap_or_else(|| Ok("external-agent-id".to_string()))
    }
}

#[derive(Default)]
struct FakeTelemetryInner {
    trails: Vec<(String, Vec<TrailItem>)>,
    monitorings: Vec<(String, Vec<MonitoringChunk>)>,
    imbalances: Vec<(String, ImbalanceEntry)>,
}

/// Records every telemetry upload.
#[derive(Default)]
pub struct FakeTelemetry {
    inner: Mutex<FakeTelemetryInner>,
}

impl FakeTelemetry {
    pub fn trails(&self) -> Vec<(String, Vec<TrailItem>)> {
        self.inner.lock().trails.clone()
    }

    pub fn monitorings(&self) -> Vec<(String, Vec<MonitoringChunk>)> {
        self.inner.lock().monitorings.clone()
    }

    pub fn imbalances(&self) -> Vec<(String, ImbalanceEntry)> {
        self.inner.lock().imbalances.clone()
    }
}

#[async_trait]
impl TelemetryClient for FakeTelemetry {
    async fn send_trails(&self, job_id: &str, trails: &[TrailItem]) -> Result<(), BackendError> {
        self.inner
            .lock()
            .trails
            .push((job_id.to_string(), trails.to_vec()));
        Ok(())
    }

    async fn send_monitorings(
        &self,
        job_id: &str,
        chunks: &[MonitoringChunk],
    ) -> Result<(), BackendError> {
        self.inner
            .lock()
            .monitorings
            .push((job_id.to_string(), chunks.to_vec()));
        Ok(())
    }

    async fn set_imbalance_and_dsc(
        &self,
        job_id: &str,
        rps: u64,
        timestamp: i64,
        comment: &str,
    ) -> Result<(), BackendError> {
        self.inner.lock().imbalances.push((
            job_id.to_string(),
            ImbalanceEntry {
                timestamp,
                rps,
                message: comment.to_string(),
            },
        ));
        Ok(())
    }
}

/// A recorded `send_log` call.
#[derive(Debug, Clone)]
pub struct SendLogCall {
    pub log_group_id: String,
    pub messages: Vec<LogMessage>,
    pub resource_type: String,
    pub resource_id: String,
}

#[derive(Default)]
struct FakeLogClientInner {
    calls: Vec<SendLogCall>,
    fail_next: VecDeque<BackendError>,
}

/// Records shipped log batches.
#[derive(Default)]
pub struct FakeLogClient {
    inner: Mutex<FakeLogClientInner>,
}

impl FakeLogClient {
    pub fn calls(&self) -> Vec<SendLogCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_next(&self, error: BackendError) {
        self.inner.lock().fail_next.push_back(error);
    }
}

#[async_trait]
impl LogClient for FakeLogClient {
    async fn send_log(
        &self,
        log_group_id: &str,
        messages: &[LogMessage],
        resource_type: &str,
        resource_id: &str,
    ) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.fail_next.pop_front() {
            return Err(error);
        }
        inner.calls.push(SendLogCall {
            log_group_id: log_group_id.to_string(),
            messages: messages.to_vec(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct FakeStorageInner {
    downloads: Vec<(StorageObject, PathBuf)>,
    uploads: Vec<(PathBuf, String, String)>,
    fail_uploads: bool,
}

/// In-memory object store.
#[derive(Default)]
pub struct FakeStorage {
    inner: Mutex<FakeStorageInner>,
}

impl FakeStorage {
    pub fn downloads(&self) -> Vec<(StorageObject, PathBuf)> {
        self.inner.lock().downloads.clone()
    }

    /// `(source, key, bucket)` triples in upload order.
    pub fn uploads(&self) -> Vec<(PathBuf, String, String)> {
        self.inner.lock().uploads.clone()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.inner.lock().fail_uploads = fail;
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn download(
        &self,
        object: &StorageObject,
        path: &Path,
    ) -> Result<(), ObjectStorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ObjectStorageError(e.to_string()))?;
        }
        std::fs::write(path, b"stored ammo").map_err(|e| ObjectStorageError(e.to_string()))?;
        self.inner
            .lock()
            .downloads
            .push((object.clone(), path.to_path_buf()));
        Ok(())
    }

    async fn upload(&self, source: &Path, key: &str, bucket: &str) -> Result<(), ObjectStorageError> {
        let mut inner = self.inner.lock();
        if inner.fail_uploads {
            return Err(ObjectStorageError(format!("upload of {key} refused")));
        }
        inner
            .uploads
            .push((source.to_path_buf(), key.to_string(), bucket.to_string()));
        Ok(())
    }
}

/// Scripted generator worker controlled from tests.
pub struct FakeGeneratorWorker {
    test_id: String,
    state: Mutex<WorkerState>,
    pipes: Mutex<Option<GeneratorPipes>>,
    /// Queue handles tests can push pipe data into.
    pub trails: Arc<BoundedQueue<TrailItem>>,
    pub monitorings: Arc<BoundedQueue<MonitoringChunk>>,
    pub imbalances: Arc<BoundedQueue<ImbalanceEntry>>,
    commands: Mutex<Vec<String>>,
    pub spec: GeneratorSpec,
}

impl FakeGeneratorWorker {
    fn new(test_id: String, spec: GeneratorSpec) -> Self {
        let trails = Arc::new(BoundedQueue::new(0));
        let monitorings = Arc::new(BoundedQueue::new(0));
        let imbalances = Arc::new(BoundedQueue::new(0));
        Self {
            test_id,
            state: Mutex::new(WorkerState::Preparing),
            pipes: Mutex::new(Some(GeneratorPipes {
                trails: trails.clone(),
                monitorings: monitorings.clone(),
                imbalances: imbalances.clone(),
            })),
            trails,
            monitorings,
            imbalances,
            commands: Mutex::new(Vec::new()),
            spec,
        }
    }

    pub fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Commands received, in order (`"run"`, `"stop"`).
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl GeneratorWorker for FakeGeneratorWorker {
    fn test_id(&self) -> &str {
        &self.test_id
    }

    fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    async fn start_shooting(&self) -> Result<(), GeneratorError> {
        self.commands.lock().push("run".to_string());
        *self.state.lock() = WorkerState::Running;
        Ok(())
    }

    async fn stop(&self, _timeout: Duration) -> Result<(), GeneratorError> {
        self.commands.lock().push("stop".to_string());
        let mut state = self.state.lock();
        if !state.is_finished() {
            *state = WorkerState::Finished(Some(0));
        }
        Ok(())
    }

    fn take_pipes(&self) -> Option<GeneratorPipes> {
        self.pipes.lock().take()
    }
}

#[derive(Default)]
struct FakeGeneratorInner {
    prepare_error: Option<GeneratorError>,
    next_test_id: Option<String>,
    lock_held: bool,
    finish_immediately: bool,
    workers: Vec<Arc<FakeGeneratorWorker>>,
}

/// Scripted generator adapter.
#[derive(Default)]
pub struct FakeGenerator {
    inner: Mutex<FakeGeneratorInner>,
}

impl FakeGenerator {
    pub fn fail_next_prepare(&self, error: GeneratorError) {
        self.inner.lock().prepare_error = Some(error);
    }

    /// Use `test_id` for the next prepared worker.
    pub fn set_next_test_id(&self, test_id: impl Into<String>) {
        self.inner.lock().next_test_id = Some(test_id.into());
    }

    pub fn set_lock_held(&self, held: bool) {
        self.inner.lock().lock_held = held;
    }

    /// Prepared workers come up already finished with exit code 0; the run
    /// then settles from the finish file (or its absence).
    pub fn finish_workers_immediately(&self, finish: bool) {
        self.inner.lock().finish_immediately = finish;
    }

    pub fn workers(&self) -> Vec<Arc<FakeGeneratorWorker>> {
        self.inner.lock().workers.clone()
    }

    pub fn last_worker(&self) -> Option<Arc<FakeGeneratorWorker>> {
        self.inner.lock().workers.last().cloned()
    }
}

#[async_trait]
impl GeneratorAdapter for FakeGenerator {
    async fn prepare(
        &self,
        spec: GeneratorSpec,
    ) -> Result<Arc<dyn GeneratorWorker>, GeneratorError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.prepare_error.take() {
            return Err(error);
        }
        let test_id = inner
            .next_test_id
            .take()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let worker = Arc::new(FakeGeneratorWorker::new(test_id, spec));
        if inner.finish_immediately {
            worker.set_state(WorkerState::Finished(Some(0)));
        }
        inner.workers.push(worker.clone());
        Ok(worker)
    }

    fn is_lock_held(&self, _lock_dir: &Path) -> bool {
        self.inner.lock().lock_held
    }
}

/// Bundles the fakes into a [`ClientFactory`].
#[derive(Default)]
pub struct FakeClientFactory {
    pub agent_client: Arc<FakeAgentClient>,
    pub backend: Arc<FakeBackend>,
    pub telemetry: Arc<FakeTelemetry>,
    pub storage: Arc<FakeStorage>,
    pub log_client: Arc<FakeLogClient>,
    pub events_log_client: Arc<FakeLogClient>,
}

impl ClientFactory for FakeClientFactory {
    fn create_agent_client(&self) -> Arc<dyn AgentClient> {
        self.agent_client.clone()
    }

    fn create_backend_client(&self, _agent: &AgentInfo) -> Arc<dyn BackendClient> {
        self.backend.clone()
    }

    fn create_telemetry_client(&self, _agent: &AgentInfo) -> Arc<dyn TelemetryClient> {
        self.telemetry.clone()
    }

    fn create_storage_client(&self) -> Arc<dyn StorageClient> {
        self.storage.clone()
    }

    fn create_log_client(&self) -> Arc<dyn LogClient> {
        self.log_client.clone()
    }

    fn create_events_log_client(&self, _agent: &AgentInfo) -> Arc<dyn LogClient> {
        self.events_log_client.clone()
    }
}
