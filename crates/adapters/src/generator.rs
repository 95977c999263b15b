// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generator worker contract and the data-pipe item types.
//!
//! The generator runs as a child process. Its embedded data pipe emits
//! per-second aggregates ("trails"), host monitoring chunks and, when an
//! autostop criterion fires, a single imbalance entry. The adapter demuxes
//! those into bounded queues the engine's reporters drain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use barrage_core::collections::BoundedQueue;
use barrage_core::error::GeneratorError;

/// One second of aggregated request metrics plus the matching stats record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailItem {
    pub data: Value,
    pub stats: Value,
}

/// A batch of host monitoring metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringChunk(pub Value);

/// The breaking point reported by an autostop criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceEntry {
    pub timestamp: i64,
    pub rps: u64,
    pub message: String,
}

/// Lifecycle state of a generator worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Config validated, waiting for the shooting signal.
    Preparing,
    /// Shooting (or winding down) a test.
    Running,
    Finished(Option<i32>),
}

impl WorkerState {
    pub fn is_finished(self) -> bool {
        matches!(self, WorkerState::Finished(_))
    }
}

/// Queues populated by the worker's data pipe. Taken once by the engine.
pub struct GeneratorPipes {
    pub trails: Arc<BoundedQueue<TrailItem>>,
    pub monitorings: Arc<BoundedQueue<MonitoringChunk>>,
    pub imbalances: Arc<BoundedQueue<ImbalanceEntry>>,
}

/// Everything a worker needs to run one test.
#[derive(Debug, Clone)]
pub struct GeneratorSpec {
    /// Patched job config dumped to disk by the tank client.
    pub config_path: PathBuf,
    /// YAML patch documents applied over the config.
    pub patches: Vec<String>,
    /// Test-data files staged for the run.
    pub files: Vec<PathBuf>,
    pub tests_dir: PathBuf,
    pub lock_dir: PathBuf,
    /// Extra environment for the child, applied only for unset variables.
    pub env: Vec<(String, String)>,
}

/// A prepared generator run.
#[async_trait]
pub trait GeneratorWorker: Send + Sync {
    /// The generator's internal id of this run; artifact dir name.
    fn test_id(&self) -> &str;

    fn state(&self) -> WorkerState;

    fn is_alive(&self) -> bool {
        !self.state().is_finished()
    }

    /// Fire the single-shot shooting signal.
    async fn start_shooting(&self) -> Result<(), GeneratorError>;

    /// Ask the worker to stop and wait up to `timeout` for it to finish.
    async fn stop(&self, timeout: Duration) -> Result<(), GeneratorError>;

    /// Hand out the data-pipe queues; `None` after the first call.
    fn take_pipes(&self) -> Option<GeneratorPipes>;
}

/// Creates prepared workers and inspects the run lock.
#[async_trait]
pub trait GeneratorAdapter: Send + Sync {
    async fn prepare(&self, spec: GeneratorSpec) -> Result<Arc<dyn GeneratorWorker>, GeneratorError>;

    /// True when another process holds the generator's exclusive-run lock.
    fn is_lock_held(&self, lock_dir: &Path) -> bool;
}
