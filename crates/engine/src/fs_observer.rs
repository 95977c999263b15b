// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disk-pressure healthcheck over the agent's working directories.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use barrage_core::error::ServiceError;
use barrage_core::fs::{ensure_dir, Fs, FsUsage};
use barrage_core::healthcheck::HealthCheck;
use barrage_core::observer::{ObserveSpec, Observer};
use barrage_core::units::{format_bytes, parse_bytes};

use crate::cleanup::FilesystemCleanup;
use crate::filesystem::FilesystemUsage;

/// Serializes destructive filesystem work against in-flight jobs.
///
/// Job execution holds the exclusive side for the duration of a run; cleanup
/// takes the shared side non-blockingly and skips when the lock is busy.
#[derive(Debug, Default)]
pub struct MutationLock {
    inner: Arc<RwLock<()>>,
}

impl MutationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive hold for a running job.
    pub async fn acquire_exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        self.inner.clone().write_owned().await
    }

    /// Non-blocking shared hold for cleanup; `None` when a job is running.
    pub fn try_acquire_shared(&self) -> Option<tokio::sync::OwnedRwLockReadGuard<()>> {
        self.inner.clone().try_read_owned().ok()
    }
}

enum CleanupTier {
    TmpDir,
    TestsDir,
    None,
}

struct Requirement {
    path: PathBuf,
    required: i64,
    cleanup: CleanupTier,
}

/// Healthcheck of the tmp/tests/lock directories.
pub struct FileSystemObserver {
    fs: Fs,
    observer: Observer,
    usage: FilesystemUsage,
    mutation_lock: Arc<MutationLock>,
    resource_cache_dir: Option<PathBuf>,
    requirements: Vec<Requirement>,
}

impl FileSystemObserver {
    pub fn new(
        fs: Fs,
        observer: Observer,
        mutation_lock: Arc<MutationLock>,
        resource_cache_dir: Option<PathBuf>,
    ) -> Self {
        let requirements = vec![
            Requirement {
                path: fs.tmp_dir.clone(),
                required: parse_bytes("2G"),
                cleanup: CleanupTier::TmpDir,
            },
            Requirement {
                path: fs.tests_dir.clone(),
                required: parse_bytes("2G"),
                cleanup: CleanupTier::TestsDir,
            },
            Requirement {
                path: fs.lock_dir.clone(),
                required: parse_bytes("1M"),
                cleanup: CleanupTier::None,
            },
        ];
        Self {
            fs,
            observer,
            usage: FilesystemUsage::new(),
            mutation_lock,
            resource_cache_dir,
            requirements,
        }
    }

    fn check_free_space(
        &self,
        requirement: &Requirement,
        usage: Option<&FsUsage>,
    ) -> Result<(), ServiceError> {
        if requirement.required == -1 {
            return Ok(());
        }
        if !self.usage.is_usable() {
            tracing::debug!("filesystem healthcheck skip: no usage probe available");
            return Ok(());
        }
        let Some(usage) = usage else {
            tracing::warn!(
                "unable to find free space info for dir {}",
                requirement.path.display()
            );
            return Ok(());
        };
        if usage.available == -1 || usage.available >= requirement.required {
            return Ok(());
        }

        // under pressure: try to reclaim, unless a job owns the directories
        if let Some(_shared) = self.mutation_lock.try_acquire_shared() {
            let cleaner = FilesystemCleanup::new(&self.fs, None, self.resource_cache_dir.clone());
            match requirement.cleanup {
                CleanupTier::TmpDir => cleaner.clean_temporary_dir(requirement.required as u64),
                CleanupTier::TestsDir => {
                    cleaner.clean_tests_dirs(requirement.required as u64);
                    cleaner.clean_stpd_cache_files(requirement.required as u64);
                }
                CleanupTier::None => {}
            }
        } else {
            tracing::debug!("cleanup skipped: a job holds the mutation lock");
        }

        let refreshed = self.usage.get_batch(std::slice::from_ref(&requirement.path));
        let available = refreshed
            .get(&requirement.path)
            .map(|u| u.available)
            .unwrap_or(usage.available);
        if available != -1 && available < requirement.required {
            return Err(ServiceError::NotEnoughFreeSpace(format!(
                "agent has not enough free space for dir \"{}\": {}; required minimum {}",
                requirement.path.display(),
                format_bytes(available.max(0) as u64),
                format_bytes(requirement.required as u64),
            )));
        }
        Ok(())
    }
}

impl HealthCheck for FileSystemObserver {
    fn healthcheck(&self) -> Result<(), ServiceError> {
        // broken working dirs are critical: the agent cannot take jobs
        let dir_spec: ObserveSpec<ServiceError> = ObserveSpec::new()
            .error(|_| true)
            .critical(|_| true)
            .suppress(|_| true);
        for requirement in &self.requirements {
            let stage = format!("check working dir {}", requirement.path.display());
            self.observer.observe(&stage, &dir_spec, || {
                ensure_dir(&requirement.path)
                    .map(|_| ())
                    .map_err(ServiceError::from)
            })?;
        }

        let paths: Vec<PathBuf> = self
            .requirements
            .iter()
            .map(|r| r.path.clone())
            .collect();
        let usage = self.usage.get_batch(&paths);

        let space_spec: ObserveSpec<ServiceError> = ObserveSpec::new()
            .error(|e| matches!(e, ServiceError::NotEnoughFreeSpace(_)))
            .suppress(|e| matches!(e, ServiceError::NotEnoughFreeSpace(_)));
        for requirement in &self.requirements {
            let stage = format!("check free space {}", requirement.path.display());
            self.observer.observe(&stage, &space_spec, || {
                self.check_free_space(requirement, usage.get(&requirement.path))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fs_observer_tests.rs"]
mod tests;
