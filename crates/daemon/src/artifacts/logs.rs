// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ships the generator's log files to the job's cloud log group.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use barrage_core::cancellation::{Cancellation, CancellationLevel};
use barrage_core::error::{ArtifactUploadError, ServiceError};
use barrage_core::job::{GeneratorKind, Job};

use barrage_adapters::clients::{LogClient, LogMessage, Severity};

use super::ArtifactUploader;

/// The logging backend refuses longer messages.
pub const MESSAGE_MAX_LENGTH: usize = 64 * 1024;
/// Records per `send_log` call.
pub const CHUNK_MAX_SIZE: usize = 100;

/// Which log file of a finished test is being shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Tank,
    Phantom,
    Pandora,
    Jmeter,
}

impl LogKind {
    pub fn name(self) -> &'static str {
        match self {
            LogKind::Tank => "tank",
            LogKind::Phantom => "phantom",
            LogKind::Pandora => "pandora",
            LogKind::Jmeter => "jmeter",
        }
    }

    fn for_generator(kind: GeneratorKind) -> Option<Self> {
        match kind {
            GeneratorKind::Phantom => Some(LogKind::Phantom),
            GeneratorKind::Pandora => Some(LogKind::Pandora),
            GeneratorKind::Jmeter => Some(LogKind::Jmeter),
            GeneratorKind::Unknown => None,
        }
    }
}

pub struct LogUploaderService {
    log_client: Arc<dyn LogClient>,
    cancellation: Arc<Cancellation>,
}

impl LogUploaderService {
    pub fn new(log_client: Arc<dyn LogClient>, cancellation: Arc<Cancellation>) -> Self {
        Self {
            log_client,
            cancellation,
        }
    }

    async fn send_log_file(
        &self,
        job: &Job,
        artifact_dir: &Path,
        log_group_id: &str,
        kind: LogKind,
    ) -> Result<(), ServiceError> {
        self.cancellation.raise_on_set(CancellationLevel::Forced)?;
        let Some(log_file) = log_file_for(artifact_dir, kind) else {
            tracing::error!("no log file to send for {}", kind.name());
            return Ok(());
        };

        let resource_type = format!("loadtesting.log.{}", kind.name());
        let chunks = read_log_chunks(&log_file, MESSAGE_MAX_LENGTH, CHUNK_MAX_SIZE)
            .map_err(|e| wrap_error(job, artifact_dir, log_group_id, kind, &e.to_string()))?;
        for chunk in chunks {
            self.cancellation.raise_on_set(CancellationLevel::Forced)?;
            let messages: Vec<LogMessage> = chunk
                .into_iter()
                .map(|message| LogMessage {
                    message,
                    labels: Default::default(),
                    severity: Severity::Info,
                    created_at: Utc::now(),
                })
                .collect();
            self.log_client
                .send_log(log_group_id, &messages, &resource_type, &job.id)
                .await
                .map_err(|e| wrap_error(job, artifact_dir, log_group_id, kind, &e.to_string()))?;
        }
        tracing::debug!("logs were sent for {}", kind.name());
        Ok(())
    }
}

fn wrap_error(
    job: &Job,
    artifact_dir: &Path,
    log_group_id: &str,
    kind: LogKind,
    message: &str,
) -> ServiceError {
    ServiceError::ArtifactUpload(ArtifactUploadError(format!(
        "failed to send log file {} from {} for job id({}) into log group id({log_group_id}): \
         {message}",
        kind.name(),
        artifact_dir.display(),
        job.id,
    )))
}

#[async_trait]
impl ArtifactUploader for LogUploaderService {
    async fn publish_artifacts(&self, job: &Job) -> Result<(), ServiceError> {
        let (Some(log_group_id), Some(artifact_dir)) =
            (job.log_group_id.clone(), job.artifact_dir_path.clone())
        else {
            return Ok(());
        };
        tracing::info!("sending logs");
        self.send_log_file(job, &artifact_dir, &log_group_id, LogKind::Tank)
            .await?;
        if let Some(kind) = LogKind::for_generator(job.generator()) {
            self.send_log_file(job, &artifact_dir, &log_group_id, kind)
                .await?;
        }
        Ok(())
    }
}

/// The log file this kind writes into the artifact dir: `tank.log` itself,
/// or `<kind>_*.log` (no further underscores).
pub fn log_file_for(artifact_dir: &Path, kind: LogKind) -> Option<PathBuf> {
    if kind == LogKind::Tank {
        let tank_log = artifact_dir.join("tank.log");
        return tank_log.is_file().then_some(tank_log);
    }
    let prefix = format!("{}_", kind.name());
    let entries = std::fs::read_dir(artifact_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".log"))
        else {
            continue;
        };
        if !middle.contains('_') && entry.path().is_file() {
            return Some(entry.path());
        }
    }
    None
}

/// Read a log file into chunks of at most `chunk_max` messages, each message
/// at most `message_max` bytes; oversize lines are split into fixed slices.
pub fn read_log_chunks(
    path: &Path,
    message_max: usize,
    chunk_max: usize,
) -> std::io::Result<Vec<Vec<String>>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut messages: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut push_piece = |current: &mut String, messages: &mut Vec<String>, piece: &str| {
        if !current.is_empty() && current.len() + piece.len() > message_max {
            messages.push(std::mem::take(current));
        }
        current.push_str(piece);
    };

    for line in reader.lines() {
        let mut line = line?;
        line.push('\n');
        if line.len() > message_max {
            tracing::warn!("log line exceeds the per-message limit, sending it in slices");
            let mut rest = line.as_str();
            while !rest.is_empty() {
                let take = slice_len(rest, message_max);
                push_piece(&mut current, &mut messages, &rest[..take]);
                rest = &rest[take..];
            }
        } else {
            push_piece(&mut current, &mut messages, &line);
        }
    }
    if !current.is_empty() {
        messages.push(current);
    }

    Ok(barrage_core::reporter::chop(messages, chunk_max))
}

/// Longest prefix of `s` that fits `max` bytes on a char boundary.
fn slice_len(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end.max(1)
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
