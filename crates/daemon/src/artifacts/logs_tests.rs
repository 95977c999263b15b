// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use barrage_adapters::fake::FakeLogClient;
use serde_json::json;

fn test_dir() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("tank.log"), b"line one\nline two\n").unwrap();
    std::fs::write(tmp.path().join("phantom_8080.log"), b"phantom says hi\n").unwrap();
    std::fs::write(tmp.path().join("phantom_extra_8080.log"), b"nope\n").unwrap();
    tmp
}

fn phantom_job(dir: &Path) -> Job {
    let mut job = Job::new("job-1");
    job.config = json!({"phantom": {"package": "generator.plugins.Phantom", "enabled": true}});
    job.log_group_id = Some("lg-1".to_string());
    job.artifact_dir_path = Some(dir.to_path_buf());
    job
}

#[test]
fn finds_the_generator_log_by_prefix() {
    let dir = test_dir();
    assert_eq!(
        log_file_for(dir.path(), LogKind::Tank).unwrap(),
        dir.path().join("tank.log")
    );
    // phantom_extra_8080.log has an extra underscore and is skipped
    assert_eq!(
        log_file_for(dir.path(), LogKind::Phantom).unwrap(),
        dir.path().join("phantom_8080.log")
    );
    assert!(log_file_for(dir.path(), LogKind::Pandora).is_none());
}

#[test]
fn chunks_respect_message_and_record_limits() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("big.log");
    let mut content = String::new();
    for i in 0..250 {
        content.push_str(&format!("line {i}\n"));
    }
    std::fs::write(&path, &content).unwrap();

    // tiny message budget: every line is its own message
    let chunks = read_log_chunks(&path, 10, 100).unwrap();
    let total: usize = chunks.iter().map(Vec::len).sum();
    assert!(chunks.iter().all(|chunk| chunk.len() <= 100));
    assert!(chunks
        .iter()
        .flatten()
        .all(|message| message.len() <= 10));
    let rejoined: String = chunks.iter().flatten().cloned().collect();
    assert_eq!(rejoined, content);
    assert!(total >= 250);
}

#[test]
fn oversize_lines_are_sliced() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("wide.log");
    std::fs::write(&path, format!("{}\n", "x".repeat(25))).unwrap();
    let chunks = read_log_chunks(&path, 10, 100).unwrap();
    let messages: Vec<String> = chunks.into_iter().flatten().collect();
    assert!(messages.iter().all(|m| m.len() <= 10));
    assert_eq!(messages.concat(), format!("{}\n", "x".repeat(25)));
}

#[tokio::test]
async fn ships_tank_and_generator_logs() {
    let dir = test_dir();
    let client = Arc::new(FakeLogClient::default());
    let uploader = LogUploaderService::new(client.clone(), Arc::new(Cancellation::new()));
    let job = phantom_job(dir.path());

    uploader.publish_artifacts(&job).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].log_group_id, "lg-1");
    assert_eq!(calls[0].resource_type, "loadtesting.log.tank");
    assert_eq!(calls[0].resource_id, "job-1");
    assert_eq!(calls[1].resource_type, "loadtesting.log.phantom");
    assert!(calls[1].messages[0].message.contains("phantom says hi"));
}

#[tokio::test]
async fn send_failures_wrap_as_artifact_upload_errors() {
    let dir = test_dir();
    let client = Arc::new(FakeLogClient::default());
    client.fail_next(barrage_core::error::BackendError::unavailable("down"));
    let uploader = LogUploaderService::new(client, Arc::new(Cancellation::new()));
    let job = phantom_job(dir.path());

    let err = uploader.publish_artifacts(&job).await.unwrap_err();
    assert!(matches!(err, ServiceError::ArtifactUpload(_)));
    assert!(err.to_string().contains("lg-1"));
}

#[tokio::test]
async fn jobs_without_log_group_are_skipped() {
    let dir = test_dir();
    let client = Arc::new(FakeLogClient::default());
    let uploader = LogUploaderService::new(client.clone(), Arc::new(Cancellation::new()));
    let mut job = phantom_job(dir.path());
    job.log_group_id = None;
    uploader.publish_artifacts(&job).await.unwrap();
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn forced_cancellation_propagates() {
    let dir = test_dir();
    let cancellation = Arc::new(Cancellation::new());
    cancellation.notify("shutdown", CancellationLevel::Forced);
    let uploader = LogUploaderService::new(Arc::new(FakeLogClient::default()), cancellation);
    let job = phantom_job(dir.path());
    let err = uploader.publish_artifacts(&job).await.unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled(_)));
}
