// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered cleanup of the agent's working directories.
//!
//! Every tier is best-effort: it logs its failures and never raises. The
//! forbidden set protects the directories a running job depends on.

use std::collections::BTreeSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use barrage_core::fs::Fs;
use barrage_core::job::{Job, JobPluginKind};

const DEFAULT_JOB_DISK_LIMIT_MB: u64 = 2048;
/// Headroom over the ResourceCheck figure; its free-space math differs from
/// ours.
const DISK_LIMIT_HEADROOM_MB: u64 = 100;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 86_400);
const RESOURCE_FILE_MARKER: &str = "downloaded_resource";

/// Per-job cleaner of tmp/tests/cache directories.
pub struct FilesystemCleanup {
    fs: Fs,
    forbidden: BTreeSet<PathBuf>,
    job_disk_limit: u64,
    stpd_cache_ttl: Duration,
    resource_cache_ttl: Duration,
    resource_cache_dir: Option<PathBuf>,
}

impl FilesystemCleanup {
    pub fn new(fs: &Fs, job: Option<&Job>, resource_cache_dir: Option<PathBuf>) -> Self {
        let mut forbidden: BTreeSet<PathBuf> = [
            fs.stpd_cache_dir(),
            fs.tests_dir.clone(),
            fs.tmp_dir.clone(),
            fs.tests_dir.join("lunapark"),
        ]
        .into_iter()
        .collect();
        if let Some(job) = job {
            if let Some(test_data_dir) = &job.test_data_dir {
                forbidden.insert(test_data_dir.clone());
                forbidden.insert(PathBuf::from(
                    test_data_dir
                        .display()
                        .to_string()
                        .replace("/test_data_", "/"),
                ));
            }
            if let Some(artifact_dir) = &job.artifact_dir_path {
                forbidden.insert(artifact_dir.clone());
            }
        }
        let forbidden = forbidden
            .into_iter()
            .filter(|p| p.exists())
            .filter_map(|p| p.canonicalize().ok())
            .collect();

        Self {
            fs: fs.clone(),
            forbidden,
            job_disk_limit: job_disk_limit(job),
            stpd_cache_ttl: DEFAULT_CACHE_TTL,
            resource_cache_ttl: DEFAULT_CACHE_TTL,
            resource_cache_dir,
        }
    }

    pub fn with_ttls(mut self, stpd_cache_ttl: Duration, resource_cache_ttl: Duration) -> Self {
        self.stpd_cache_ttl = stpd_cache_ttl;
        self.resource_cache_ttl = resource_cache_ttl;
        self
    }

    /// The job's disk demand in bytes.
    pub fn job_disk_limit(&self) -> u64 {
        self.job_disk_limit
    }

    /// Remove children of the tmp dir, oldest first, until `limit` bytes are
    /// available.
    pub fn clean_temporary_dir(&self, limit: u64) {
        let tmp_dir = self.fs.tmp_dir.clone();
        if !tmp_dir.exists() {
            tracing::debug!("temporary folder is not found");
            return;
        }
        self.delete_until(&tmp_dir, limit, |entry| {
            !self.is_forbidden(entry) && (entry.is_dir() || entry.is_file())
        });
    }

    /// Remove old per-test directories until `limit` bytes are available.
    pub fn clean_tests_dirs(&self, limit: u64) {
        let tests_dir = self.fs.tests_dir.clone();
        if !tests_dir.exists() {
            tracing::debug!("tests folder is not found");
            return;
        }
        self.delete_until(&tests_dir, limit, |entry| {
            !self.is_forbidden(entry)
                && entry.is_dir()
                && entry.file_name().is_some_and(|n| n != "stpd-cache")
        });
    }

    /// Remove shooting-cache files older than the TTL, or any until `limit`
    /// bytes are available.
    pub fn clean_stpd_cache_files(&self, limit: u64) {
        let cache_dir = self.fs.stpd_cache_dir();
        if !cache_dir.exists() {
            tracing::debug!("stpd cache folder is not found");
            return;
        }
        self.delete_aged_or_until(&cache_dir, limit, self.stpd_cache_ttl, |entry| {
            !self.is_forbidden(entry) && entry.is_file()
        });
    }

    /// Remove downloaded resources from the generator's resource cache.
    pub fn clean_resource_cache(&self, limit: u64) {
        let Some(cache_dir) = self.resource_cache_dir.clone() else {
            tracing::debug!("resource cache dir is not set");
            return;
        };
        if !cache_dir.exists() {
            tracing::debug!("resource cache folder is not found");
            return;
        }
        self.delete_aged_or_until(&cache_dir, limit, self.resource_cache_ttl, |entry| {
            !self.is_forbidden(entry)
                && entry.is_file()
                && entry
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(RESOURCE_FILE_MARKER))
        });
    }

    /// Run every tier with the job's disk limit.
    pub fn cleanup(&self) {
        let limit = self.job_disk_limit;
        self.clean_temporary_dir(limit);
        self.clean_stpd_cache_files(limit);
        self.clean_resource_cache(limit);
        self.clean_tests_dirs(limit);
    }

    fn is_forbidden(&self, path: &Path) -> bool {
        match path.canonicalize() {
            Ok(resolved) => self.forbidden.contains(&resolved),
            Err(_) => false,
        }
    }

    fn delete_until(&self, dir: &Path, limit: u64, matches: impl Fn(&Path) -> bool) {
        for path in self.candidates(dir, &matches) {
            if available_space(dir) >= limit {
                break;
            }
            remove_entry(&path);
        }
    }

    fn delete_aged_or_until(
        &self,
        dir: &Path,
        limit: u64,
        ttl: Duration,
        matches: impl Fn(&Path) -> bool,
    ) {
        let threshold = chrono::Utc::now().timestamp() - ttl.as_secs() as i64;
        for (path, ctime) in self.candidates_with_ctime(dir, &matches) {
            if ctime > threshold && available_space(dir) >= limit {
                break;
            }
            remove_entry(&path);
        }
    }

    fn candidates(&self, dir: &Path, matches: &impl Fn(&Path) -> bool) -> Vec<PathBuf> {
        self.candidates_with_ctime(dir, matches)
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    /// Matching children of `dir`, oldest first by ctime.
    fn candidates_with_ctime(
        &self,
        dir: &Path,
        matches: &impl Fn(&Path) -> bool,
    ) -> Vec<(PathBuf, i64)> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cannot list {}: {e}", dir.display());
                return Vec::new();
            }
        };
        let mut candidates: Vec<(PathBuf, i64)> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| matches(path))
            .filter_map(|path| {
                let ctime = std::fs::metadata(&path).ok()?.ctime();
                Some((path, ctime))
            })
            .collect();
        candidates.sort_by_key(|(_, ctime)| *ctime);
        candidates
    }
}

fn job_disk_limit(job: Option<&Job>) -> u64 {
    let mut limit_mb = job
        .map(|job| job.plugins(JobPluginKind::ResourceCheck))
        .and_then(|plugins| plugins.first().cloned())
        .and_then(|(_, section)| section.get("disk_limit").and_then(|v| v.as_i64()))
        .unwrap_or(DEFAULT_JOB_DISK_LIMIT_MB as i64);
    if limit_mb <= 0 {
        limit_mb = DEFAULT_JOB_DISK_LIMIT_MB as i64;
    }
    (limit_mb as u64 + DISK_LIMIT_HEADROOM_MB) * 1024 * 1024
}

fn available_space(path: &Path) -> u64 {
    fs2::available_space(path).unwrap_or(0)
}

fn remove_entry(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => tracing::debug!("cleanup removed {}", path.display()),
        Err(e) => tracing::warn!("cleanup failed for {}: {e}", path.display()),
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
