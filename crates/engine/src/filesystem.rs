// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disk-usage probing with a `df` fallback.
//!
//! The native probe asks the OS per path; when that fails the probe falls
//! back to parsing `df` output and matching each path to its longest-prefix
//! mount. Each strategy is latched off after its first failure; with both
//! latched the probe returns nothing and the caller skips its check.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use barrage_core::fs::FsUsage;
use barrage_core::units::parse_bytes;

const DF_COMMAND: &str = "df";
const DF_ARGS: &[&str] = &["-l", "-B1", "-x", "fuse", "-x", "tmpfs", "-x", "devtmpfs"];

#[derive(Debug, Default)]
pub struct FilesystemUsage {
    native_failed: AtomicBool,
    fallback_failed: AtomicBool,
}

impl FilesystemUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while at least one probe strategy is still usable.
    pub fn is_usable(&self) -> bool {
        !self.native_failed.load(Ordering::Relaxed)
            || !self.fallback_failed.load(Ordering::Relaxed)
    }

    /// Usage per path; paths without a resolvable mount are absent.
    pub fn get_batch(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, FsUsage> {
        if !self.native_failed.load(Ordering::Relaxed) {
            match native_usage(paths) {
                Ok(usage) => return usage,
                Err(e) => {
                    tracing::warn!("native disk usage probe failed: {e}");
                    self.native_failed.store(true, Ordering::Relaxed);
                }
            }
        }
        if !self.fallback_failed.load(Ordering::Relaxed) {
            match df_usage(paths) {
                Ok(usage) => return usage,
                Err(e) => {
                    tracing::warn!("df disk usage probe failed: {e}");
                    self.fallback_failed.store(true, Ordering::Relaxed);
                }
            }
        }
        BTreeMap::new()
    }
}

fn native_usage(paths: &[PathBuf]) -> std::io::Result<BTreeMap<PathBuf, FsUsage>> {
    let mut result = BTreeMap::new();
    for path in paths {
        let total = fs2::total_space(path)?;
        let available = fs2::available_space(path)?;
        let free = fs2::free_space(path)?;
        result.insert(
            path.clone(),
            FsUsage {
                size: total as i64,
                used: total.saturating_sub(free) as i64,
                available: available as i64,
                mount: path.clone(),
            },
        );
    }
    Ok(result)
}

fn df_usage(paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, FsUsage>, String> {
    let output = std::process::Command::new(DF_COMMAND)
        .args(DF_ARGS)
        .output()
        .map_err(|e| format!("cannot run df: {e}"))?;
    if !output.status.success() {
        return Err(format!("df exited with {:?}", output.status.code()));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mounts = parse_df_output(&text)?;
    Ok(assign_mounts(paths, &mounts))
}

/// Parse `df -B1` output into per-mount usage records.
pub fn parse_df_output(text: &str) -> Result<Vec<FsUsage>, String> {
    let mut mounts = Vec::new();
    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(format!("unexpected df line: {line:?}"));
        }
        mounts.push(FsUsage {
            size: parse_bytes(fields[1]),
            used: parse_bytes(fields[2]),
            available: parse_bytes(fields[3]),
            mount: PathBuf::from(fields[5]),
        });
    }
    Ok(mounts)
}

/// Give each path the usage of its longest-prefix mount.
pub fn assign_mounts(paths: &[PathBuf], mounts: &[FsUsage]) -> BTreeMap<PathBuf, FsUsage> {
    let mut result = BTreeMap::new();
    for path in paths {
        let mut best: Option<&FsUsage> = None;
        for usage in mounts {
            if path_has_prefix(path, &usage.mount) {
                let better = match best {
                    Some(current) => path_has_prefix(&usage.mount, &current.mount),
                    None => true,
                };
                if better {
                    best = Some(usage);
                }
            }
        }
        if let Some(usage) = best {
            result.insert(path.clone(), usage.clone());
        }
    }
    result
}

fn path_has_prefix(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;
