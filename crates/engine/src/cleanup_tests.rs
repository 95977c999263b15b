// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

struct Sandbox {
    _tmp: tempfile::TempDir,
    fs: Fs,
}

fn sandbox() -> Sandbox {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Fs {
        tmp_dir: tmp.path().join("_tmp"),
        tests_dir: tmp.path().join("tests"),
        lock_dir: tmp.path().join("lock"),
    };
    std::fs::create_dir_all(&fs.tmp_dir).unwrap();
    std::fs::create_dir_all(fs.stpd_cache_dir()).unwrap();
    std::fs::create_dir_all(&fs.lock_dir).unwrap();
    Sandbox { _tmp: tmp, fs }
}

fn job_with_data_dir(fs: &Fs) -> Job {
    let mut job = Job::new("job-1");
    let data_dir = fs.tmp_dir.join("test_data_job-1");
    std::fs::create_dir_all(&data_dir).unwrap();
    job.test_data_dir = Some(data_dir);
    job
}

#[test]
fn temporary_dir_cleanup_spares_the_forbidden_set() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    let job = job_with_data_dir(fs);
    std::fs::write(fs.tmp_dir.join("stale-file"), b"x").unwrap();
    std::fs::create_dir(fs.tmp_dir.join("stale-dir")).unwrap();
    std::fs::write(fs.tmp_dir.join("stale-dir/inner"), b"x").unwrap();

    let cleanup = FilesystemCleanup::new(fs, Some(&job), None);
    cleanup.clean_temporary_dir(u64::MAX);

    assert!(!fs.tmp_dir.join("stale-file").exists());
    assert!(!fs.tmp_dir.join("stale-dir").exists());
    // the job's own test data survives
    assert!(fs.tmp_dir.join("test_data_job-1").exists());
    assert!(fs.tmp_dir.exists());
}

#[test]
fn zero_limit_deletes_nothing() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    std::fs::write(fs.tmp_dir.join("kept"), b"x").unwrap();
    let cleanup = FilesystemCleanup::new(fs, None, None);
    cleanup.clean_temporary_dir(0);
    assert!(fs.tmp_dir.join("kept").exists());
}

#[test]
fn tests_dirs_cleanup_keeps_cache_and_artifact_dir() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    let mut job = Job::new("job-1");
    let artifact_dir = fs.tests_dir.join("current-test");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    job.artifact_dir_path = Some(artifact_dir.clone());
    std::fs::create_dir_all(fs.tests_dir.join("old-test")).unwrap();
    std::fs::write(fs.tests_dir.join("loose-file"), b"x").unwrap();

    let cleanup = FilesystemCleanup::new(fs, Some(&job), None);
    cleanup.clean_tests_dirs(u64::MAX);

    assert!(!fs.tests_dir.join("old-test").exists());
    assert!(artifact_dir.exists());
    assert!(fs.stpd_cache_dir().exists());
    // plain files under tests_dir are not this tier's business
    assert!(fs.tests_dir.join("loose-file").exists());
}

#[test]
fn stpd_cache_honors_ttl() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    std::fs::write(fs.stpd_cache_dir().join("cached.stpd"), b"x").unwrap();

    let fresh = FilesystemCleanup::new(fs, None, None);
    fresh.clean_stpd_cache_files(0);
    assert!(fs.stpd_cache_dir().join("cached.stpd").exists());

    let expired = FilesystemCleanup::new(fs, None, None)
        .with_ttls(Duration::ZERO, Duration::ZERO);
    expired.clean_stpd_cache_files(0);
    assert!(!fs.stpd_cache_dir().join("cached.stpd").exists());
}

#[test]
fn resource_cache_only_touches_downloaded_resources() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    let resource_dir = fs.tmp_dir.join("resources");
    std::fs::create_dir_all(&resource_dir).unwrap();
    std::fs::write(resource_dir.join("abc_downloaded_resource_1"), b"x").unwrap();
    std::fs::write(resource_dir.join("unrelated"), b"x").unwrap();

    let cleanup = FilesystemCleanup::new(fs, None, Some(resource_dir.clone()))
        .with_ttls(Duration::ZERO, Duration::ZERO);
    cleanup.clean_resource_cache(0);

    assert!(!resource_dir.join("abc_downloaded_resource_1").exists());
    assert!(resource_dir.join("unrelated").exists());
}

#[test]
fn oldest_entries_go_first() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    std::fs::write(fs.tmp_dir.join("older"), b"x").unwrap();
    std::thread::sleep(Duration::from_millis(20));
    std::fs::write(fs.tmp_dir.join("newer"), b"x").unwrap();

    let cleanup = FilesystemCleanup::new(fs, None, None);
    let candidates = cleanup.candidates(&fs.tmp_dir, &|p: &std::path::Path| p.is_file());
    assert_eq!(candidates[0].file_name().unwrap(), "older");
    assert_eq!(candidates[1].file_name().unwrap(), "newer");
}

#[yare::parameterized(
    defaulted     = { json!({}), (2048 + 100) * 1024 * 1024 },
    configured    = { json!({"rc": {"package": "generator.plugins.ResourceCheck", "enabled": true, "disk_limit": 512}}), (512 + 100) * 1024 * 1024 },
    non_positive  = { json!({"rc": {"package": "generator.plugins.ResourceCheck", "enabled": true, "disk_limit": -5}}), (2048 + 100) * 1024 * 1024 },
)]
fn disk_limit_from_resource_check(config: serde_json::Value, expected: u64) {
    let sandbox = sandbox();
    let mut job = Job::new("job-1");
    job.config = config;
    let cleanup = FilesystemCleanup::new(&sandbox.fs, Some(&job), None);
    assert_eq!(cleanup.job_disk_limit(), expected);
}

#[test]
fn full_cleanup_runs_every_tier() {
    let sandbox = sandbox();
    let fs = &sandbox.fs;
    std::fs::write(fs.tmp_dir.join("scratch"), b"x").unwrap();
    std::fs::create_dir_all(fs.tests_dir.join("finished-test")).unwrap();
    // a sane environment has far more than the job limit available, so the
    // limit-driven tiers leave everything alone
    let cleanup = FilesystemCleanup::new(fs, None, None);
    cleanup.cleanup();
    assert!(fs.tmp_dir.exists());
    assert!(fs.tests_dir.exists());
}
