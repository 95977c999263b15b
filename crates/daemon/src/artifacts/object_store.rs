// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store artifact publisher.
//!
//! Collects files under the job's artifact directory by include/exclude
//! globs, then either zips them (deflate) or uploads them one by one.
//! Archive entries use paths relative to the artifact directory; paths
//! outside it are stored under the `__root/` prefix.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use barrage_core::cancellation::{Cancellation, CancellationLevel};
use barrage_core::error::{ArtifactUploadError, ServiceError};
use barrage_core::job::{ArtifactSettings, Job};

use barrage_adapters::clients::StorageClient;

use super::ArtifactUploader;

pub const ROOT_SEGMENT: &str = "__root";

pub struct ObjectStoreUploader {
    storage: Arc<dyn StorageClient>,
    cancellation: Arc<Cancellation>,
}

impl ObjectStoreUploader {
    pub fn new(storage: Arc<dyn StorageClient>, cancellation: Arc<Cancellation>) -> Self {
        Self {
            storage,
            cancellation,
        }
    }
}

#[async_trait]
impl ArtifactUploader for ObjectStoreUploader {
    async fn publish_artifacts(&self, job: &Job) -> Result<(), ServiceError> {
        let Some(settings) = &job.upload_artifact_settings else {
            tracing::info!("artifact settings not provided, nothing to upload");
            return Ok(());
        };
        let Some(artifact_dir) = &job.artifact_dir_path else {
            tracing::info!("job has no artifacts, nothing to upload");
            return Ok(());
        };

        self.cancellation.raise_on_set(CancellationLevel::Forced)?;
        let artifacts = collect_artifacts(settings, artifact_dir)
            .map_err(|e| ServiceError::ArtifactUpload(ArtifactUploadError(e)))?;

        let mut errors = Vec::new();
        for (local_path, key) in artifacts {
            self.cancellation.raise_on_set(CancellationLevel::Forced)?;
            if let Err(e) = self
                .storage
                .upload(&local_path, &key, &settings.output_bucket)
                .await
            {
                tracing::error!(
                    "failed to publish artifact {} as {key}: {e}",
                    local_path.display()
                );
                errors.push(e.to_string());
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::ArtifactUpload(ArtifactUploadError(format!(
                "failed to upload one or more artifacts: {}",
                errors.join("\n")
            ))));
        }
        Ok(())
    }
}

/// Resolve the files to publish and the keys to publish them under.
pub fn collect_artifacts(
    settings: &ArtifactSettings,
    artifact_dir: &Path,
) -> Result<Vec<(PathBuf, String)>, String> {
    let root = artifact_dir
        .canonicalize()
        .map_err(|e| format!("artifact dir {}: {e}", artifact_dir.display()))?;

    let mut files: BTreeSet<PathBuf> = BTreeSet::new();
    for pattern in &settings.filter_include {
        files.extend(rglob(&root, pattern)?);
    }
    for pattern in &settings.filter_exclude {
        for path in rglob(&root, pattern)? {
            files.remove(&path);
        }
    }
    let files: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| {
            let readable = std::fs::File::open(path).is_ok();
            if !readable {
                tracing::error!("file {} is not readable", path.display());
            }
            readable
        })
        .collect();

    if settings.is_archive {
        let archive_key = format!("{}.zip", settings.output_name);
        let archive_file = archive_key
            .rsplit('/')
            .next()
            .unwrap_or(archive_key.as_str());
        let archive_path = root.join(archive_file);
        write_archive(&archive_path, &root, &files)?;
        Ok(vec![(archive_path, archive_key)])
    } else {
        Ok(files
            .into_iter()
            .map(|path| {
                let key = format!("{}/{}", settings.output_name, relative_key(&path, &root));
                (path, key)
            })
            .collect())
    }
}

fn write_archive(archive_path: &Path, root: &Path, files: &[PathBuf]) -> Result<(), String> {
    let file = std::fs::File::create(archive_path)
        .map_err(|e| format!("cannot create archive {}: {e}", archive_path.display()))?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for path in files {
        let entry_name = relative_key(path, root);
        archive
            .start_file(entry_name, options)
            .map_err(|e| format!("archive entry failed: {e}"))?;
        let data =
            std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        archive
            .write_all(&data)
            .map_err(|e| format!("archive write failed: {e}"))?;
    }
    archive
        .finish()
        .map_err(|e| format!("archive finish failed: {e}"))?;
    Ok(())
}

/// Upload key for `path`: relative to `root` when inside it, otherwise under
/// the `__root/` prefix.
pub fn relative_key(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => {
            let trimmed = path
                .display()
                .to_string()
                .trim_start_matches('/')
                .to_string();
            format!("{ROOT_SEGMENT}/{trimmed}")
        }
    }
}

/// Recursive glob under `root`: patterns without a separator match file
/// names at any depth; patterns with one match the path relative to `root`.
fn rglob(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, String> {
    let compiled =
        glob::Pattern::new(pattern).map_err(|e| format!("bad filter {pattern:?}: {e}"))?;
    let mut matched = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot list {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if !path.is_file() {
                continue;
            }
            let hit = if pattern.contains('/') {
                path.strip_prefix(root)
                    .map(|relative| compiled.matches_path(relative))
                    .unwrap_or(false)
            } else {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| compiled.matches(name))
                    .unwrap_or(false)
            };
            if hit {
                matched.push(path);
            }
        }
    }
    Ok(matched)
}

#[cfg(test)]
#[path = "object_store_tests.rs"]
mod tests;
