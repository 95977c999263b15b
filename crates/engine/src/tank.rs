// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle wrapper around the generator worker.
//!
//! One `TankClient` drives at most one worker at a time:
//!
//! ```text
//! idle ── prepare_job ──▶ preparing ── run_job ──▶ testing ── stop/finish ──▶ idle
//! ```
//!
//! `prepare_job` leaves the worker armed but not shooting; the control loop
//! fires `run_job` when the backend says so. `finish` drains the telemetry
//! reporters and runs the imbalance finalizer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OwnedRwLockWriteGuard;

use barrage_core::error::TankError;
use barrage_core::fs::Fs;
use barrage_core::job::{Job, JobPluginKind};
use barrage_core::job_status::{
    status, JobStatus, TankStatus, AUTOSTOP_EXIT_CODES, INTERNAL_ERROR_TYPE,
};
use barrage_core::reporter::{Reporter, ReporterGuard, ReporterOptions};

use barrage_adapters::clients::TelemetryClient;
use barrage_adapters::generator::{
    GeneratorAdapter, GeneratorSpec, GeneratorWorker, MonitoringChunk, TrailItem, WorkerState,
};

use crate::cleanup::FilesystemCleanup;
use crate::fs_observer::MutationLock;
use crate::imbalance::ImbalanceUploader;
use crate::pipes::{MonitoringHandler, TrailHandler};

/// File the generator leaves in its test dir on completion.
pub const FINISH_STATUS_FILE: &str = "finish_status.yaml";

const TANK_WORKER_TIMEOUT: Duration = Duration::from_secs(60);
const PIPE_REPORT_INTERVAL: Duration = Duration::from_secs(1);

type TokenGetter = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Environment propagated into the generator child, only for variables the
/// process does not already have.
#[derive(Clone, Default)]
pub struct TankVariables {
    pub token_getter: Option<TokenGetter>,
    pub s3_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
}

impl TankVariables {
    fn to_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(token) = self.token_getter.as_ref().and_then(|getter| getter()) {
            env.push(("TOKEN".to_string(), token));
        }
        if let Some(url) = &self.s3_endpoint_url {
            env.push(("S3_ENDPOINT_URL".to_string(), url.clone()));
        }
        if let Some(key_id) = &self.aws_access_key_id {
            env.push(("AWS_ACCESS_KEY_ID".to_string(), key_id.clone()));
        }
        if let Some(secret) = &self.aws_secret_access_key {
            env.push(("AWS_SECRET_ACCESS_KEY".to_string(), secret.clone()));
        }
        env
    }
}

struct Active {
    test_id: String,
    worker: Arc<dyn GeneratorWorker>,
    trail_reporter: Arc<Reporter<TrailItem>>,
    monitoring_reporter: Arc<Reporter<MonitoringChunk>>,
    trail_guard: Option<ReporterGuard<TrailItem>>,
    monitoring_guard: Option<ReporterGuard<MonitoringChunk>>,
    finalizer: Option<ImbalanceUploader>,
    shooting_started: bool,
    _mutation_guard: OwnedRwLockWriteGuard<()>,
}

/// Drives the generator through one job at a time.
pub struct TankClient {
    fs: Fs,
    backend_api_address: String,
    adapter: Arc<dyn GeneratorAdapter>,
    telemetry: Arc<dyn TelemetryClient>,
    variables: TankVariables,
    resource_cache_dir: Option<PathBuf>,
    mutation_lock: Arc<MutationLock>,
    worker_timeout: Duration,
    active: Mutex<Option<Active>>,
}

impl TankClient {
    pub fn new(
        fs: Fs,
        backend_api_address: impl Into<String>,
        adapter: Arc<dyn GeneratorAdapter>,
        telemetry: Arc<dyn TelemetryClient>,
        variables: TankVariables,
        resource_cache_dir: Option<PathBuf>,
        mutation_lock: Arc<MutationLock>,
    ) -> Self {
        Self {
            fs,
            backend_api_address: backend_api_address.into(),
            adapter,
            telemetry,
            variables,
            resource_cache_dir,
            mutation_lock,
            worker_timeout: TANK_WORKER_TIMEOUT,
            active: Mutex::new(None),
        }
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Validate, patch and stage a job; the worker ends up armed and waiting
    /// for the shooting signal.
    pub async fn prepare_job(&self, job: &mut Job, files: Vec<PathBuf>) -> Result<(), TankError> {
        if self.is_test_session_running() {
            return Err(TankError::new("another test is already running"));
        }

        let patches = self.config_patches(job)?;
        let config_path = self.dump_job_config(job)?;

        FilesystemCleanup::new(&self.fs, Some(job), self.resource_cache_dir.clone()).cleanup();

        let mutation_guard = self.mutation_lock.acquire_exclusive().await;
        let spec = GeneratorSpec {
            config_path,
            patches,
            files,
            tests_dir: self.fs.tests_dir.clone(),
            lock_dir: self.fs.lock_dir.clone(),
            env: self.variables.to_env(),
        };
        let worker = self
            .adapter
            .prepare(spec)
            .await
            .map_err(|e| TankError::new(e.to_string()))?;

        let test_id = worker.test_id().to_string();
        job.tank_job_id = Some(test_id.clone());
        job.artifact_dir_path = Some(self.fs.tests_dir.join(&test_id));

        let pipes = worker
            .take_pipes()
            .ok_or_else(|| TankError::new("generator data pipes are already taken"))?;

        let trail_reporter = Arc::new(Reporter::new(
            vec![Box::new(TrailHandler::new(self.telemetry.clone(), &job.id)) as _],
            ReporterOptions {
                report_interval: PIPE_REPORT_INTERVAL,
                ..ReporterOptions::default()
            },
        ));
        trail_reporter.add_source(pipes.trails.clone());

        let monitoring_reporter = Arc::new(Reporter::new(
            vec![Box::new(MonitoringHandler::new(self.telemetry.clone(), &job.id)) as _],
            ReporterOptions {
                report_interval: PIPE_REPORT_INTERVAL,
                ..ReporterOptions::default()
            },
        ));
        monitoring_reporter.add_source(pipes.monitorings.clone());

        let finalizer = job.plugin_enabled(JobPluginKind::Autostop).then(|| {
            ImbalanceUploader::new(&job.id, pipes.imbalances.clone(), self.telemetry.clone())
        });

        *self.active.lock() = Some(Active {
            test_id,
            worker,
            trail_reporter,
            monitoring_reporter,
            trail_guard: None,
            monitoring_guard: None,
            finalizer,
            shooting_started: false,
            _mutation_guard: mutation_guard,
        });
        Ok(())
    }

    /// Fire the shooting signal and start streaming telemetry.
    pub async fn run_job(&self) -> Result<(), TankError> {
        let worker = {
            let mut active = self.active.lock();
            let Some(active) = active.as_mut() else {
                return Err(TankError::new("trying to run job before prepare stage"));
            };
            if active.shooting_started {
                None
            } else {
                active.shooting_started = true;
                active.trail_guard = Some(active.trail_reporter.run());
                active.monitoring_guard = Some(active.monitoring_reporter.run());
                Some(active.worker.clone())
            }
        };
        if let Some(worker) = worker {
            worker
                .start_shooting()
                .await
                .map_err(|e| TankError::new(e.to_string()))?;
        }
        Ok(())
    }

    /// Gracefully stop the worker and wait for it to wind down.
    pub async fn stop_job(&self) -> Result<(), TankError> {
        let worker = {
            let active = self.active.lock();
            active
                .as_ref()
                .filter(|a| a.worker.is_alive())
                .map(|a| a.worker.clone())
        };
        if let Some(worker) = worker {
            worker
                .stop(self.worker_timeout)
                .await
                .map_err(|e| TankError::new(e.to_string()))?;
        }
        Ok(())
    }

    /// Stop, drain the telemetry reporters, run finalizers and drop the run.
    pub async fn finish(&self) {
        if let Err(e) = self.stop_job().await {
            tracing::warn!("stop during finish failed: {e}");
        }
        let active = self.active.lock().take();
        let Some(mut active) = active else {
            return;
        };
        match active.trail_guard.take() {
            Some(guard) => guard.stop().await,
            None => active.trail_reporter.report(true).await,
        }
        match active.monitoring_guard.take() {
            Some(guard) => guard.stop().await,
            None => active.monitoring_reporter.report(true).await,
        }
        if let Some(finalizer) = active.finalizer.take() {
            finalizer.run().await;
        }
        // mutation guard drops here, releasing the working dirs to cleanup
    }

    pub fn get_tank_status(&self) -> TankStatus {
        let state = self.active.lock().as_ref().map(|a| a.worker.state());
        match state {
            Some(WorkerState::Preparing) => TankStatus::PreparingTest,
            Some(WorkerState::Running) => TankStatus::Testing,
            _ => {
                if self.adapter.is_lock_held(&self.fs.lock_dir) {
                    TankStatus::Testing
                } else {
                    TankStatus::ReadyForTest
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        !matches!(
            self.get_tank_status(),
            TankStatus::PreparingTest | TankStatus::Testing
        )
    }

    fn is_test_session_running(&self) -> bool {
        let worker_busy = self
            .active
            .lock()
            .as_ref()
            .is_some_and(|a| !a.worker.state().is_finished());
        worker_busy || self.adapter.is_lock_held(&self.fs.lock_dir)
    }

    /// Status of `job_id`: live worker state while it runs, the generator's
    /// finish file afterwards.
    pub fn get_job_status(&self, job_id: &str) -> JobStatus {
        {
            let active = self.active.lock();
            if let Some(active) = active.as_ref() {
                if active.test_id == job_id && !active.worker.state().is_finished() {
                    return match active.worker.state() {
                        WorkerState::Preparing => JobStatus::from_status("PREPARING"),
                        _ => JobStatus::from_status("TESTING"),
                    };
                }
            }
        }

        let test_dir = self.fs.tests_dir.join(job_id);
        if !test_dir.exists() {
            tracing::warn!("get_job_status: {} directory not found", test_dir.display());
            return JobStatus::from_status(status::FINISHED);
        }
        let finish_file = test_dir.join(FINISH_STATUS_FILE);
        if !finish_file.exists() {
            tracing::warn!("get_job_status: {} file not found", finish_file.display());
            return JobStatus::from_status(status::FINISHED);
        }
        let parsed = std::fs::read_to_string(&finish_file)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_yaml::from_str::<serde_yaml::Value>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(doc) => parse_finish_status(&doc),
            Err(e) => {
                tracing::error!("couldn't parse job status file: {e}");
                JobStatus::with_details(
                    status::FAILED,
                    Some("couldn't parse job status file".to_string()),
                    Some(INTERNAL_ERROR_TYPE.to_string()),
                    None,
                )
            }
        }
    }

    fn config_patches(&self, job: &Job) -> Result<Vec<String>, TankError> {
        let mut patch = serde_json::json!({
            "core": {
                "artifacts_base_dir": self.fs.tests_dir.display().to_string(),
                "lock_dir": self.fs.lock_dir.display().to_string(),
            },
        });
        if let Some(phantom) = job.config.get("phantom") {
            if phantom.get("cache_dir").is_none() {
                patch["phantom"] = serde_json::json!({
                    "cache_dir": self.fs.stpd_cache_dir().display().to_string(),
                });
            }
        }
        // keep the generator from double-reporting to our own backend
        for (name, section) in job.plugins(JobPluginKind::Uploader) {
            let api_address = section.get("api_address").and_then(|v| v.as_str());
            if api_address == Some(self.backend_api_address.as_str()) {
                patch[name.as_str()] = serde_json::json!({ "enabled": false });
            }
        }
        serde_yaml::to_string(&patch)
            .map(|doc| vec![doc])
            .map_err(|e| TankError::new(format!("cannot render config patch: {e}")))
    }

    fn dump_job_config(&self, job: &Job) -> Result<PathBuf, TankError> {
        let dir = self.fs.tmp_dir.join(&job.id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| TankError::new(format!("cannot create config dir: {e}")))?;
        let path = dir.join("config");
        let rendered = serde_yaml::to_string(&job.config)
            .map_err(|e| TankError::new(format!("cannot render job config: {e}")))?;
        std::fs::write(&path, rendered)
            .map_err(|e| TankError::new(format!("cannot write job config: {e}")))?;
        Ok(path)
    }
}

fn yaml_str(doc: &serde_yaml::Value, key: &str) -> String {
    doc.get(key)
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn yaml_exit_code(doc: &serde_yaml::Value) -> Option<i32> {
    match doc.get("exit_code") {
        Some(serde_yaml::Value::Number(n)) => n.as_i64().map(|v| v as i32),
        // an unparsable exit code is still a failure
        Some(serde_yaml::Value::String(s)) => Some(s.parse().unwrap_or(1)),
        _ => None,
    }
}

/// Split the finish file into the reported error and its type.
pub fn extract_error(doc: &serde_yaml::Value) -> (String, Option<String>) {
    let error = yaml_str(doc, "error");
    if !error.is_empty() {
        return (error, None);
    }
    let tank_msg = yaml_str(doc, "tank_msg");
    if !tank_msg.is_empty() {
        return (tank_msg, Some(INTERNAL_ERROR_TYPE.to_string()));
    }
    if let Some(code) = yaml_exit_code(doc) {
        if code != 0 && !AUTOSTOP_EXIT_CODES.contains(&code) {
            return ("Unknown generator error".to_string(), None);
        }
    }
    (String::new(), None)
}

/// Interpret the generator's `finish_status.yaml`.
pub fn parse_finish_status(doc: &serde_yaml::Value) -> JobStatus {
    let (error, error_type) = extract_error(doc);
    let exit_code = yaml_exit_code(doc);
    let job_status = if error.is_empty() {
        if exit_code.is_some_and(|code| AUTOSTOP_EXIT_CODES.contains(&code)) {
            status::AUTOSTOPPED.to_string()
        } else {
            let status_code = yaml_str(doc, "status_code");
            if status_code.is_empty() {
                status::FAILED.to_string()
            } else {
                status_code
            }
        }
    } else {
        status::FAILED.to_string()
    };
    let error = (!error.is_empty()).then_some(error);
    JobStatus::with_details(&job_status, error, error_type, exit_code)
}

#[cfg(test)]
#[path = "tank_tests.rs"]
mod tests;
