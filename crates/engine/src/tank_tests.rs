// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use barrage_adapters::fake::{FakeGenerator, FakeTelemetry};
use barrage_adapters::generator::ImbalanceEntry;
use serde_json::json;

struct Setup {
    _tmp: tempfile::TempDir,
    fs: Fs,
    adapter: Arc<FakeGenerator>,
    telemetry: Arc<FakeTelemetry>,
    tank: TankClient,
}

fn setup() -> Setup {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Fs {
        tmp_dir: tmp.path().join("_tmp"),
        tests_dir: tmp.path().join("tests"),
        lock_dir: tmp.path().join("lock"),
    };
    std::fs::create_dir_all(&fs.tmp_dir).unwrap();
    std::fs::create_dir_all(&fs.tests_dir).unwrap();
    let adapter = Arc::new(FakeGenerator::default());
    let telemetry = Arc::new(FakeTelemetry::default());
    let tank = TankClient::new(
        fs.clone(),
        "https://backend.example",
        adapter.clone(),
        telemetry.clone(),
        TankVariables::default(),
        None,
        Arc::new(MutationLock::new()),
    )
    .with_worker_timeout(Duration::from_millis(200));
    Setup {
        _tmp: tmp,
        fs,
        adapter,
        telemetry,
        tank,
    }
}

fn job_with_config(config: serde_json::Value) -> Job {
    let mut job = Job::new("job-1");
    job.config = config;
    job
}

#[tokio::test]
async fn prepare_stages_the_worker() {
    let setup = setup();
    setup.adapter.set_next_test_id("test-42");
    let mut job = job_with_config(json!({"phantom": {"package": "generator.plugins.Phantom", "enabled": true}}));

    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();

    assert_eq!(job.tank_job_id.as_deref(), Some("test-42"));
    assert_eq!(
        job.artifact_dir_path.as_deref(),
        Some(setup.fs.tests_dir.join("test-42").as_path())
    );
    // config was dumped under tmp_dir/<job id>/config
    let dumped = setup.fs.tmp_dir.join("job-1").join("config");
    assert!(dumped.is_file());

    let worker = setup.adapter.last_worker().unwrap();
    let patch: serde_yaml::Value = serde_yaml::from_str(&worker.spec.patches[0]).unwrap();
    assert_eq!(
        patch["core"]["artifacts_base_dir"].as_str().unwrap(),
        setup.fs.tests_dir.display().to_string()
    );
    // phantom without cache_dir gets the shared stpd cache
    assert_eq!(
        patch["phantom"]["cache_dir"].as_str().unwrap(),
        setup.fs.stpd_cache_dir().display().to_string()
    );
    assert_eq!(setup.tank.get_tank_status(), TankStatus::PreparingTest);
    assert!(!setup.tank.is_idle());
}

#[tokio::test]
async fn uploaders_pointing_at_our_backend_are_disabled() {
    let setup = setup();
    let mut job = job_with_config(json!({
        "uploader": {"package": "generator.plugins.DataUploader", "enabled": true, "api_address": "https://backend.example"},
        "other-uploader": {"package": "generator.plugins.DataUploader", "enabled": true, "api_address": "https://elsewhere.example"},
    }));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();
    let worker = setup.adapter.last_worker().unwrap();
    let patch: serde_yaml::Value = serde_yaml::from_str(&worker.spec.patches[0]).unwrap();
    assert_eq!(patch["uploader"]["enabled"].as_bool(), Some(false));
    assert!(patch.get("other-uploader").is_none());
}

#[tokio::test]
async fn tank_variables_reach_the_worker_environment() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Fs {
        tmp_dir: tmp.path().join("_tmp"),
        tests_dir: tmp.path().join("tests"),
        lock_dir: tmp.path().join("lock"),
    };
    std::fs::create_dir_all(&fs.tmp_dir).unwrap();
    let adapter = Arc::new(FakeGenerator::default());
    let variables = TankVariables {
        token_getter: Some(Arc::new(|| Some("secret-token".to_string()))),
        s3_endpoint_url: Some("https://storage.example".to_string()),
        aws_access_key_id: Some("AKID".to_string()),
        aws_secret_access_key: None,
    };
    let tank = TankClient::new(
        fs,
        "https://backend.example",
        adapter.clone(),
        Arc::new(FakeTelemetry::default()),
        variables,
        None,
        Arc::new(MutationLock::new()),
    );
    let mut job = job_with_config(json!({}));
    tank.prepare_job(&mut job, vec![]).await.unwrap();

    let env = &adapter.last_worker().unwrap().spec.env;
    let get = |key: &str| {
        env.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(get("TOKEN"), Some("secret-token"));
    assert_eq!(get("S3_ENDPOINT_URL"), Some("https://storage.example"));
    assert_eq!(get("AWS_ACCESS_KEY_ID"), Some("AKID"));
    assert_eq!(get("AWS_SECRET_ACCESS_KEY"), None);
}

#[tokio::test]
async fn prepare_refuses_when_lock_is_held() {
    let setup = setup();
    setup.adapter.set_lock_held(true);
    let mut job = job_with_config(json!({}));
    let err = setup.tank.prepare_job(&mut job, vec![]).await.unwrap_err();
    assert!(err.to_string().contains("already running"));
}

#[tokio::test]
async fn prepare_refuses_while_a_worker_is_live() {
    let setup = setup();
    let mut job = job_with_config(json!({}));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();
    let mut second = Job::new("job-2");
    second.config = json!({});
    let err = setup.tank.prepare_job(&mut second, vec![]).await.unwrap_err();
    assert!(err.to_string().contains("already running"));
}

#[tokio::test]
async fn run_before_prepare_is_an_error() {
    let setup = setup();
    let err = setup.tank.run_job().await.unwrap_err();
    assert!(err.to_string().contains("before prepare"));
}

#[tokio::test]
async fn run_job_fires_shooting_once_and_streams_trails() {
    let setup = setup();
    let mut job = job_with_config(json!({}));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();
    let worker = setup.adapter.last_worker().unwrap();
    worker.trails.push(TrailItem {
        data: json!({"ts": 1}),
        stats: json!({"reqps": 5}),
    });

    setup.tank.run_job().await.unwrap();
    setup.tank.run_job().await.unwrap();
    assert_eq!(worker.commands(), vec!["run"]);
    assert_eq!(setup.tank.get_tank_status(), TankStatus::Testing);

    for _ in 0..50 {
        if !setup.telemetry.trails().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let trails = setup.telemetry.trails();
    assert_eq!(trails.len(), 1);
    assert_eq!(trails[0].0, "job-1");

    setup.tank.finish().await;
    assert_eq!(setup.tank.get_tank_status(), TankStatus::ReadyForTest);
    assert!(setup.tank.is_idle());
}

#[tokio::test]
async fn finish_runs_the_imbalance_finalizer_for_autostop_jobs() {
    let setup = setup();
    let mut job = job_with_config(json!({
        "autostop": {"package": "generator.plugins.Autostop", "enabled": true},
    }));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();
    let worker = setup.adapter.last_worker().unwrap();
    worker.imbalances.push(ImbalanceEntry {
        timestamp: 100,
        rps: 40,
        message: "first".to_string(),
    });
    worker.imbalances.push(ImbalanceEntry {
        timestamp: 200,
        rps: 60,
        message: "second".to_string(),
    });

    setup.tank.finish().await;
    let imbalances = setup.telemetry.imbalances();
    assert_eq!(imbalances.len(), 1);
    assert_eq!(imbalances[0].1.message, "second");
    assert_eq!(worker.commands(), vec!["stop"]);
}

#[tokio::test]
async fn finish_without_autostop_reports_no_imbalance() {
    let setup = setup();
    let mut job = job_with_config(json!({}));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();
    setup.tank.finish().await;
    assert!(setup.telemetry.imbalances().is_empty());
}

#[tokio::test]
async fn job_status_follows_the_live_worker() {
    let setup = setup();
    setup.adapter.set_next_test_id("test-live");
    let mut job = job_with_config(json!({}));
    setup.tank.prepare_job(&mut job, vec![]).await.unwrap();

    let status = setup.tank.get_job_status("test-live");
    assert_eq!(status.status, "PREPARING");
    assert!(!status.finished());

    setup.tank.run_job().await.unwrap();
    let status = setup.tank.get_job_status("test-live");
    assert_eq!(status.status, "TESTING");
}

#[tokio::test]
async fn job_status_defaults_to_finished_without_artifacts() {
    let setup = setup();
    let status = setup.tank.get_job_status("unknown-test");
    assert_eq!(status.status, status::FINISHED);
    assert_eq!(status.exit_code, Some(0));
}

#[tokio::test]
async fn job_status_reads_the_finish_file() {
    let setup = setup();
    let test_dir = setup.fs.tests_dir.join("done-test");
    std::fs::create_dir_all(&test_dir).unwrap();
    std::fs::write(
        test_dir.join(FINISH_STATUS_FILE),
        "status_code: FINISHED\nexit_code: 21\n",
    )
    .unwrap();
    let status = setup.tank.get_job_status("done-test");
    assert_eq!(status.status, status::AUTOSTOPPED);
    assert_eq!(status.exit_code, Some(21));
}

#[tokio::test]
async fn unparsable_finish_file_is_an_internal_failure() {
    let setup = setup();
    let test_dir = setup.fs.tests_dir.join("bad-test");
    std::fs::create_dir_all(&test_dir).unwrap();
    std::fs::write(test_dir.join(FINISH_STATUS_FILE), "[ unclosed").unwrap();
    let status = setup.tank.get_job_status("bad-test");
    assert_eq!(status.status, status::FAILED);
    assert_eq!(status.error_type.as_deref(), Some(INTERNAL_ERROR_TYPE));
}

fn doc(yaml: &str) -> serde_yaml::Value {
    serde_yaml::from_str(yaml).unwrap()
}

#[yare::parameterized(
    empty           = { "{}", "", None },
    plain_error     = { "error: some error", "some error", None },
    error_wins      = { "error: some error\ntank_msg: some tank_msg", "some error", None },
    tank_msg        = { "tank_msg: some tank_msg", "some tank_msg", Some(INTERNAL_ERROR_TYPE) },
    tank_msg_code   = { "tank_msg: some tank_msg\nexit_code: 1", "some tank_msg", Some(INTERNAL_ERROR_TYPE) },
    error_with_code = { "error: some error\nexit_code: 1", "some error", None },
    unknown_failure = { "exit_code: 1", "Unknown generator error", None },
    clean_exit      = { "exit_code: 0", "", None },
    autostop_code   = { "exit_code: 21", "", None },
)]
fn extract_error_table(yaml: &str, expected_error: &str, expected_type: Option<&str>) {
    let (error, error_type) = extract_error(&doc(yaml));
    assert_eq!(error, expected_error);
    assert_eq!(error_type.as_deref(), expected_type);
}

#[yare::parameterized(
    defaults_to_failed = { "{}", status::FAILED, Some(1) },
    autostop_21        = { "status_code: FINISHED\nexit_code: 21", status::AUTOSTOPPED, Some(21) },
    autostop_28        = { "status_code: FINISHED\nexit_code: 28", status::AUTOSTOPPED, Some(28) },
    finished           = { "status_code: FINISHED", status::FINISHED, Some(0) },
    still_testing      = { "status_code: TESTING", "TESTING", None },
    failed_with_error  = { "error: boom", status::FAILED, Some(1) },
)]
fn parse_finish_status_table(yaml: &str, expected_status: &str, expected_exit: Option<i32>) {
    let status = parse_finish_status(&doc(yaml));
    assert_eq!(status.status, expected_status);
    assert_eq!(status.exit_code, expected_exit);
}
