// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Working-directory layout and filesystem usage types.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::AgentConfig;

/// The agent's working directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fs {
    /// Scratch space; job configs and test data live here.
    pub tmp_dir: PathBuf,
    /// Per-test artifact directories.
    pub tests_dir: PathBuf,
    /// Generator's exclusive-run lock directory.
    pub lock_dir: PathBuf,
}

impl Fs {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            tmp_dir: config.work_dir.join("_tmp"),
            tests_dir: config.work_dir.join("tests"),
            lock_dir: config.lock_dir.clone(),
        }
    }

    /// Generator's shooting-payload cache under the tests dir.
    pub fn stpd_cache_dir(&self) -> PathBuf {
        self.tests_dir.join("stpd-cache")
    }
}

/// Disk usage of the mount backing a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsUsage {
    pub size: i64,
    pub used: i64,
    pub available: i64,
    pub mount: PathBuf,
}

/// Create `path` (with parents) and verify it is readable, writable and
/// traversable.
pub fn ensure_dir(path: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    // r+x: listing must succeed
    std::fs::read_dir(path)?;
    let metadata = std::fs::metadata(path)?;
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("permission denied for path {}", path.display()),
        ));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
