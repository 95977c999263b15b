// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's control loop.
//!
//! `serve` polls the control plane for a job, stages and runs it through the
//! tank client while relaying signals and statuses, then publishes
//! artifacts. Transient backend trouble is absorbed for the duration of a
//! job; only cancellation stops the loop.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use barrage_core::cancellation::{Cancellation, CancellationLevel};
use barrage_core::error::{BackendErrorKind, InvalidJobDataError, ServiceError};
use barrage_core::job::{Ammo, ArtifactSettings, Job};
use barrage_core::job_status::{status, JobStatus, TankStatus, INTERNAL_ERROR_TYPE};
use barrage_core::observer::{ObserveSpec, Observer};
use barrage_core::state::State;

use barrage_adapters::clients::{
    BackendClient, JobMessage, JobSignal, NamedService, StorageClient,
};
use barrage_engine::tank::TankClient;

use crate::artifacts::ArtifactUploader;
use crate::status_reporter::TankStatusSource;

const DEFAULT_MAX_WAITING_TIME: Duration = Duration::from_secs(300);
const TANK_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Error types claimed with failed jobs.
mod error_type {
    pub const JOB_CONFIG: &str = "JOB_CONFIG";
    pub const JOB_AMMO: &str = "JOB_AMMO";
    pub const UNKNOWN: &str = "UNKNOWN";
    pub const INTERRUPTED: &str = "INTERRUPTED";
    pub const FAILED: &str = "FAILED";
    pub const ARTIFACT_UPLOADING_FAILED: &str = "ARTIFACT_UPLOADING_FAILED";
}

/// Tuning of the control loop.
#[derive(Debug, Clone)]
pub struct AgentServiceConfig {
    /// Where per-job test data directories are created.
    pub tmp_dir: PathBuf,
    /// Polling period of the loop.
    pub sleep_time: Duration,
    /// Longest wait for the tank to become idle before a job.
    pub max_waiting_time: Duration,
}

impl AgentServiceConfig {
    pub fn new(tmp_dir: PathBuf, sleep_time: Duration) -> Self {
        Self {
            tmp_dir,
            sleep_time: sleep_time.max(Duration::from_secs(1)),
            max_waiting_time: DEFAULT_MAX_WAITING_TIME,
        }
    }
}

pub struct AgentService {
    config: AgentServiceConfig,
    backend: Arc<dyn BackendClient>,
    storage: Arc<dyn StorageClient>,
    tank: Arc<TankClient>,
    uploaders: Vec<NamedService<Arc<dyn ArtifactUploader>>>,
    cancellation: Arc<Cancellation>,
    state: Arc<State>,
    observer: Observer,
    override_status: Mutex<Option<TankStatus>>,
}

impl TankStatusSource for AgentService {
    fn tank_status(&self) -> TankStatus {
        if let Some(status) = *self.override_status.lock() {
            return status;
        }
        self.tank.get_tank_status()
    }
}

impl AgentService {
    pub fn new(
        config: AgentServiceConfig,
        backend: Arc<dyn BackendClient>,
        storage: Arc<dyn StorageClient>,
        tank: Arc<TankClient>,
        uploaders: Vec<NamedService<Arc<dyn ArtifactUploader>>>,
        cancellation: Arc<Cancellation>,
        state: Arc<State>,
    ) -> Self {
        let observer = Observer::new(state.clone(), cancellation.clone());
        Self {
            config,
            backend,
            storage,
            tank,
            uploaders,
            cancellation,
            state,
            observer,
            override_status: Mutex::new(None),
        }
    }

    /// Poll for jobs until cancellation, executing each one fully.
    pub async fn serve(&self) {
        while !self.cancellation.is_set(CancellationLevel::Graceful) {
            let iteration = async {
                let job = self.wait_for_a_job().await?;
                let job = self.execute_job(job).await?;
                self.publish_artifacts(&job).await;
                Ok::<(), ServiceError>(())
            };
            match iteration.await {
                Ok(()) => {}
                Err(ServiceError::Cancelled(_)) => {
                    tracing::info!("received interrupt signal");
                }
                Err(e) => {
                    tracing::error!("unhandled error occurred, abandoning pending job: {e}");
                }
            }
            tokio::time::sleep(self.config.sleep_time).await;
        }
    }

    /// Execute exactly `job_id` and return its result.
    pub async fn serve_single_job(&self, job_id: &str) -> Result<barrage_core::job::JobResult, ServiceError> {
        let job = self.get_job(Some(job_id)).await?.ok_or_else(|| {
            ServiceError::JobNotExecuted(format!("unable to find job with id {job_id}"))
        })?;
        if job.id != job_id {
            return Err(ServiceError::JobNotExecuted(format!(
                "requested job {job_id}, got: {}",
                job.id
            )));
        }
        let job = self.execute_job(job).await?;
        self.publish_artifacts(&job).await;
        Ok(job.result())
    }

    /// Fetch and stage a job; payload problems are claimed as failures and
    /// yield `None`.
    pub async fn get_job(&self, job_id: Option<&str>) -> Result<Option<Job>, ServiceError> {
        let message = match self.backend.get_job(job_id).await {
            Ok(message) => message,
            Err(e) if e.kind == BackendErrorKind::NotFound => {
                tracing::info!("no pending jobs for agent");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let Some(message) = message else {
            return Ok(None);
        };

        let mut job = Job::new(&message.id);
        job.log_group_id = message
            .logging_log_group_id
            .clone()
            .filter(|id| !id.is_empty());
        job.upload_artifact_settings = extract_artifact_settings(&message);
        job.test_data_dir = Some(
            self.config
                .tmp_dir
                .join(format!("test_data_{}", message.id)),
        );

        match serde_json::from_str(&message.config) {
            Ok(config) => job.config = config,
            Err(e) => {
                tracing::error!("invalid job config format: {e}");
                self.try_claim_failed(
                    &mut job,
                    format!("Invalid job config: {e}"),
                    Some(error_type::JOB_CONFIG),
                )
                .await;
                return Ok(None);
            }
        }

        match self.download_test_data(&message, &job).await {
            Ok(ammos) => {
                job.ammos = ammos;
                Ok(Some(job))
            }
            Err(e @ ServiceError::Cancelled(_)) => Err(e),
            Err(
                e @ (ServiceError::InvalidJobData(_)
                | ServiceError::ObjectStorage(_)
                | ServiceError::Backend(_)),
            ) => {
                tracing::error!("error loading test data: {e}");
                self.try_claim_failed(
                    &mut job,
                    format!("Error loading test data: {e}"),
                    Some(error_type::JOB_AMMO),
                )
                .await;
                Ok(None)
            }
            Err(e) => {
                tracing::error!("unknown error while loading test data: {e}");
                self.try_claim_failed(
                    &mut job,
                    format!("Unknown error occurred: {e}"),
                    Some(error_type::UNKNOWN),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn download_test_data(
        &self,
        message: &JobMessage,
        job: &Job,
    ) -> Result<Vec<Ammo>, ServiceError> {
        let test_data_dir = job
            .test_data_dir
            .clone()
            .unwrap_or_else(|| self.config.tmp_dir.clone());
        std::fs::create_dir_all(&test_data_dir)?;

        let mut ammos = Vec::new();
        for entry in &message.data_payload {
            if entry.name.is_empty() {
                return Err(InvalidJobDataError("Test data specified with no name.".to_string()).into());
            }
            let path = resolve_under(&test_data_dir, &entry.name).ok_or_else(|| {
                tracing::error!("cannot write ammo file for name {:?}", entry.name);
                InvalidJobDataError("Invalid test data name".to_string())
            })?;
            if entry.is_transient {
                tracing::info!(job_id = %job.id, name = %entry.name, "downloading transient ammo");
                self.backend
                    .download_transient_ammo(&job.id, &entry.name, &path)
                    .await?;
            } else {
                let object = entry.storage_object.clone().ok_or_else(|| {
                    InvalidJobDataError(format!(
                        "test data {} has no storage object",
                        entry.name
                    ))
                })?;
                tracing::info!("downloading object {}/{}", object.bucket, object.key);
                self.storage.download(&object, &path).await?;
            }
            ammos.push(Ammo {
                name: entry.name.clone(),
                path,
            });
        }
        Ok(ammos)
    }

    /// Block until the control plane hands out a job.
    pub async fn wait_for_a_job(&self) -> Result<Job, ServiceError> {
        let spec: ObserveSpec<ServiceError> = ObserveSpec::new().error(|_| true);
        loop {
            self.cancellation.raise_on_set(CancellationLevel::Graceful)?;
            let job = self
                .observer
                .observe_async("request new test from backend", &spec, self.get_job(None))
                .await?;
            if let Some(Some(job)) = job {
                return Ok(job);
            }
            tokio::time::sleep(self.config.sleep_time).await;
        }
    }

    async fn await_tank_is_ready(&self, timeout: Duration) -> Result<(), ServiceError> {
        if self.tank.is_idle() {
            return Ok(());
        }
        tracing::warn!("there is an active testing session, awaiting finish");
        let deadline = tokio::time::Instant::now() + timeout.min(self.config.max_waiting_time);
        while !self.tank.is_idle() {
            self.cancellation.raise_on_set(CancellationLevel::Graceful)?;
            if tokio::time::Instant::now() >= deadline {
                return Err(barrage_core::error::TankError::new(
                    "tank is busy for too long, cancelling job",
                )
                .into());
            }
            tokio::time::sleep(self.config.sleep_time).await;
        }
        Ok(())
    }

    /// Run one prepared job to completion, mapping every outcome to a final
    /// claimed status. The tank is always stopped and finished afterwards.
    pub async fn execute_job(&self, mut job: Job) -> Result<Job, ServiceError> {
        let result = self.execute_job_inner(&mut job).await;
        let outcome = match result {
            Ok(()) => Ok(()),
            Err(ServiceError::JobStopped) => {
                self.claim_job_status(&mut job, JobStatus::from_status(status::STOPPED))
                    .await
            }
            Err(ServiceError::Cancelled(request)) => {
                self.claim_job_failed(
                    &mut job,
                    format!("Job execution has been interrupted on agent. {request}"),
                    Some(error_type::INTERRUPTED),
                )
                .await
            }
            Err(ServiceError::Backend(e))
                if matches!(
                    e.kind,
                    BackendErrorKind::FailedPrecondition | BackendErrorKind::NotFound
                ) =>
            {
                // reporting will most likely fail the same way, but try anyway
                self.try_claim_failed(
                    &mut job,
                    format!("Backend rejected current job: {e}"),
                    Some(error_type::FAILED),
                )
                .await;
                Ok(())
            }
            Err(ServiceError::Tank(e)) => {
                self.claim_job_failed(
                    &mut job,
                    format!("Could not run job: {e}"),
                    Some(INTERNAL_ERROR_TYPE),
                )
                .await
            }
            Err(other) => Err(other),
        };

        if let Err(e) = self.tank.stop_job().await {
            tracing::warn!("failed to stop job during teardown: {e}");
        }
        self.tank.finish().await;

        outcome?;
        Ok(job)
    }

    async fn execute_job_inner(&self, job: &mut Job) -> Result<(), ServiceError> {
        self.await_tank_is_ready(TANK_READY_TIMEOUT).await?;

        let files = job
            .test_data_dir
            .as_deref()
            .map(job_data_paths)
            .unwrap_or_default();
        self.tank.prepare_job(job, files).await?;
        tracing::info!(
            job_id = %job.id,
            tank_job_id = job.tank_job_id.as_deref().unwrap_or(""),
            "prepare finished"
        );

        self.serve_lt_job(job).await?;
        tracing::info!(job_id = %job.id, "the job is finished");
        Ok(())
    }

    /// Relay signals and statuses until the job reaches a terminal state.
    async fn serve_lt_job(&self, job: &mut Job) -> Result<(), ServiceError> {
        let tank_job_id = job
            .tank_job_id
            .clone()
            .ok_or_else(|| ServiceError::Other("job has not been prepared".to_string()))?;
        // ride out transient backend trouble for the duration of the job
        let spec: ObserveSpec<ServiceError> =
            ObserveSpec::<ServiceError>::new().suppress(|e| e.is_transient_backend());
        let mut done = false;
        while !done {
            self.cancellation.raise_on_set(CancellationLevel::Graceful)?;
            let observed = self
                .observer
                .observe_async("sustain_job", &spec, async {
                    self.serve_lt_signal(&job.id).await?;
                    let job_status = self.tank.get_job_status(&tank_job_id);
                    let finished = job_status.finished();
                    if finished {
                        self.tank.finish().await;
                    }
                    self.claim_job_status(job, job_status).await?;
                    Ok::<bool, ServiceError>(finished)
                })
                .await?;
            if let Some(finished) = observed {
                done = finished;
            }
            if !done {
                tokio::time::sleep(self.config.sleep_time).await;
            }
        }
        Ok(())
    }

    async fn serve_lt_signal(&self, job_id: &str) -> Result<(), ServiceError> {
        match self.backend.get_job_signal(job_id).await? {
            JobSignal::Stop => {
                self.tank.stop_job().await?;
                Err(ServiceError::JobStopped)
            }
            JobSignal::RunIn { seconds } => self.serve_run_signal(seconds).await,
            JobSignal::Wait | JobSignal::Unspecified => Ok(()),
            JobSignal::Other(name) => Err(ServiceError::Other(format!(
                "unknown signal {name} returned from server"
            ))),
        }
    }

    async fn serve_run_signal(&self, seconds: f64) -> Result<(), ServiceError> {
        if seconds > self.config.sleep_time.as_secs_f64() {
            // too far in the future; ask again next pass
            return Ok(());
        }
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        self.tank.run_job().await?;
        Ok(())
    }

    /// Run every artifact publisher, isolating failures as post-job errors.
    pub async fn publish_artifacts(&self, job: &Job) {
        *self.override_status.lock() = Some(TankStatus::UploadingArtifacts);
        for uploader in &self.uploaders {
            match uploader.service.publish_artifacts(job).await {
                Ok(()) => {}
                Err(ServiceError::Cancelled(request)) => {
                    self.claim_post_job_error(
                        job,
                        format!("Artifact uploading has been interrupted: {request}"),
                        error_type::ARTIFACT_UPLOADING_FAILED,
                    )
                    .await;
                }
                Err(e) => {
                    tracing::error!("failed to publish artifacts to {}: {e}", uploader.name);
                    self.claim_post_job_error(
                        job,
                        e.to_string(),
                        error_type::ARTIFACT_UPLOADING_FAILED,
                    )
                    .await;
                }
            }
        }
        *self.override_status.lock() = None;
    }

    async fn claim_job_status(
        &self,
        job: &mut Job,
        job_status: JobStatus,
    ) -> Result<(), ServiceError> {
        job.update_status(job_status.clone());
        self.backend
            .claim_job_status(
                &job.id,
                &job_status.status,
                job_status.error.as_deref(),
                job_status.error_type.as_deref(),
            )
            .await?;
        if job_status.finished() {
            tracing::info!(
                job_id = %job.id,
                status = %job_status.status,
                exit_code = job_status.exit_code.unwrap_or(0),
                "job reached a terminal status"
            );
        }
        Ok(())
    }

    async fn claim_job_failed(
        &self,
        job: &mut Job,
        error: String,
        error_type: Option<&str>,
    ) -> Result<(), ServiceError> {
        let job_status = JobStatus::with_details(
            status::FAILED,
            Some(error),
            error_type.map(str::to_string),
            None,
        );
        self.claim_job_status(job, job_status).await
    }

    /// Best-effort failure claim; a claim error is only logged.
    async fn try_claim_failed(&self, job: &mut Job, error: String, error_type: Option<&str>) {
        if let Err(e) = self.claim_job_failed(job, error, error_type).await {
            tracing::error!("failed to claim {error_type:?} error for job: {e}");
        }
    }

    /// Best-effort post-job error report; never updates the job status.
    async fn claim_post_job_error(&self, job: &Job, error: String, error_type: &str) {
        if let Err(e) = self
            .backend
            .claim_job_status(&job.id, status::UNSPECIFIED, Some(&error), Some(error_type))
            .await
        {
            tracing::error!("failed to set {error_type} error to job: {e}");
        }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }
}

fn extract_artifact_settings(message: &JobMessage) -> Option<ArtifactSettings> {
    let settings = message.artifact_upload_settings.as_ref()?;
    if settings.output_bucket.is_empty() || settings.output_name.is_empty() {
        return None;
    }
    Some(ArtifactSettings {
        output_bucket: settings.output_bucket.clone(),
        output_name: settings.output_name.clone(),
        is_archive: settings.is_archive,
        filter_include: settings.filter_include.clone(),
        filter_exclude: settings.filter_exclude.clone(),
    })
}

/// Join `name` under `dir`, refusing traversal outside of it.
fn resolve_under(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut resolved = dir.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(name.trim_matches('/')).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(resolved)
}

fn job_data_paths(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries.flatten().map(|entry| entry.path()).collect()
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
