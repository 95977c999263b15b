// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed generator worker.
//!
//! The generator is spawned as a child process and driven over a line
//! protocol: the agent writes `run` / `stop` commands to its stdin, the
//! child emits JSON lines on stdout:
//!
//! ```text
//! {"event":"status","status":"preparing"|"running"|"finished"}
//! {"event":"trail","data":{…},"stats":{…}}
//! {"event":"monitoring","data":[…]}
//! {"event":"imbalance","timestamp":…,"rps":…,"message":"…"}
//! ```
//!
//! On exit the child writes `finish_status.yaml` into its test directory;
//! the engine reads that file for the final job status.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use barrage_core::collections::BoundedQueue;
use barrage_core::error::GeneratorError;
use barrage_core::reporter::chop;

use crate::generator::{
    GeneratorAdapter, GeneratorPipes, GeneratorSpec, GeneratorWorker, ImbalanceEntry,
    MonitoringChunk, TrailItem, WorkerState,
};

const PIPE_QUEUE_CAPACITY: usize = 100_000;
const MONITORING_CHUNK_SIZE: usize = 100;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PipeLine {
    Status {
        status: String,
    },
    Trail {
        data: Value,
        stats: Value,
    },
    Monitoring {
        data: Vec<Value>,
    },
    Imbalance {
        timestamp: i64,
        rps: u64,
        message: String,
    },
}

/// Spawns the configured generator command for each prepared job.
pub struct ProcessGenerator {
    command: String,
}

impl ProcessGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl GeneratorAdapter for ProcessGenerator {
    async fn prepare(
        &self,
        spec: GeneratorSpec,
    ) -> Result<Arc<dyn GeneratorWorker>, GeneratorError> {
        let test_id = new_test_id();
        let test_dir = spec.tests_dir.join(&test_id);
        tokio::fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| GeneratorError::new(format!("cannot create test dir: {e}")))?;

        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(GeneratorError::new("generator command is empty"));
        };
        let mut command = Command::new(program);
        command.args(parts);
        command
            .arg("--config")
            .arg(&spec.config_path)
            .arg("--test-dir")
            .arg(&test_dir)
            .arg("--lock-dir")
            .arg(&spec.lock_dir);
        for patch in &spec.patches {
            command.arg("--patch").arg(patch);
        }
        for file in &spec.files {
            command.arg("--file").arg(file);
        }
        for (key, value) in &spec.env {
            if std::env::var_os(key).is_none() {
                command.env(key, value);
            }
        }
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| GeneratorError::new(format!("failed to spawn generator: {e}")))?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GeneratorError::new("generator stdout is not piped"))?;

        let worker = Arc::new(ProcessGeneratorWorker {
            test_id,
            state: Arc::new(Mutex::new(WorkerState::Preparing)),
            stdin: tokio::sync::Mutex::new(stdin),
            child: Arc::new(tokio::sync::Mutex::new(child)),
            pipes: Mutex::new(Some(GeneratorPipes {
                trails: Arc::new(BoundedQueue::new(PIPE_QUEUE_CAPACITY)),
                monitorings: Arc::new(BoundedQueue::new(PIPE_QUEUE_CAPACITY)),
                imbalances: Arc::new(BoundedQueue::new(PIPE_QUEUE_CAPACITY)),
            })),
        });

        worker.spawn_reader(stdout);
        worker.spawn_exit_watcher();
        Ok(worker)
    }

    fn is_lock_held(&self, lock_dir: &Path) -> bool {
        lock_dir_is_locked(lock_dir)
    }
}

/// True when any `*.lock` file exists in `lock_dir`.
pub fn lock_dir_is_locked(lock_dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(lock_dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .path()
            .extension()
            .is_some_and(|extension| extension == "lock")
    })
}

struct ProcessGeneratorWorker {
    test_id: String,
    state: Arc<Mutex<WorkerState>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: Arc<tokio::sync::Mutex<Child>>,
    pipes: Mutex<Option<GeneratorPipes>>,
}

impl ProcessGeneratorWorker {
    fn spawn_reader(self: &Arc<Self>, stdout: tokio::process::ChildStdout) {
        let (trails, monitorings, imbalances) = {
            let pipes = self.pipes.lock();
            let Some(pipes) = pipes.as_ref() else {
                return;
            };
            (
                pipes.trails.clone(),
                pipes.monitorings.clone(),
                pipes.imbalances.clone(),
            )
        };
        let state = self.state.clone();
        let test_id = self.test_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<PipeLine>(&line) {
                    Ok(PipeLine::Status { status }) => {
                        let mut current = state.lock();
                        match status.as_str() {
                            "preparing" => *current = WorkerState::Preparing,
                            "running" => *current = WorkerState::Running,
                            // the exit watcher fills in the real code
                            "finished" => *current = WorkerState::Finished(None),
                            other => {
                                tracing::debug!(test_id, "unknown generator status {other:?}");
                            }
                        }
                    }
                    Ok(PipeLine::Trail { data, stats }) => {
                        if !trails.push(TrailItem { data, stats }) {
                            tracing::warn!(test_id, "trail queue is full, dropping sample");
                        }
                    }
                    Ok(PipeLine::Monitoring { data }) => {
                        for chunk in chop(data, MONITORING_CHUNK_SIZE) {
                            if !monitorings.push(MonitoringChunk(Value::Array(chunk))) {
                                tracing::warn!(test_id, "monitoring queue is full, dropping chunk");
                            }
                        }
                    }
                    Ok(PipeLine::Imbalance {
                        timestamp,
                        rps,
                        message,
                    }) => {
                        imbalances.push(ImbalanceEntry {
                            timestamp,
                            rps,
                            message,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(test_id, "unparsable generator pipe line: {e}");
                    }
                }
            }
        });
    }

    fn spawn_exit_watcher(self: &Arc<Self>) {
        let child = self.child.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                {
                    let mut child = child.lock().await;
                    match child.try_wait() {
                        Ok(Some(exit)) => {
                            *state.lock() = WorkerState::Finished(exit.code());
                            return;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("generator wait failed: {e}");
                            *state.lock() = WorkerState::Finished(None);
                            return;
                        }
                    }
                }
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            }
        });
    }

    async fn send_command(&self, command: &str) -> Result<(), GeneratorError> {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(GeneratorError::new("generator stdin is closed"));
        };
        pipe.write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| GeneratorError::new(format!("failed to send {command:?}: {e}")))?;
        pipe.flush()
            .await
            .map_err(|e| GeneratorError::new(format!("failed to flush {command:?}: {e}")))
    }
}

#[async_trait]
impl GeneratorWorker for ProcessGeneratorWorker {
    fn test_id(&self) -> &str {
        &self.test_id
    }

    fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    async fn start_shooting(&self) -> Result<(), GeneratorError> {
        self.send_command("run").await
    }

    async fn stop(&self, timeout: Duration) -> Result<(), GeneratorError> {
        if self.state().is_finished() {
            return Ok(());
        }
        // best-effort graceful stop; the child may already be gone
        let _ = self.send_command("stop").await;

        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.state().is_finished() {
                return Ok(());
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        let mut child = self.child.lock().await;
        child
            .start_kill()
            .map_err(|e| GeneratorError::new(format!("failed to kill generator: {e}")))?;
        Ok(())
    }

    fn take_pipes(&self) -> Option<GeneratorPipes> {
        self.pipes.lock().take()
    }
}

fn new_test_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{stamp}.{}", &suffix[..8])
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
