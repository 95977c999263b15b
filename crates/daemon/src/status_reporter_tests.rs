// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use barrage_adapters::fake::FakeBackend;
use barrage_core::error::BackendErrorKind;
use parking_lot::Mutex;

struct FixedStatus(Mutex<TankStatus>);

impl TankStatusSource for FixedStatus {
    fn tank_status(&self) -> TankStatus {
        *self.0.lock()
    }
}

struct Setup {
    backend: Arc<FakeBackend>,
    source: Arc<FixedStatus>,
    state: Arc<State>,
    cancellation: Arc<Cancellation>,
}

fn setup(status: TankStatus) -> (Setup, Arc<StatusReporter>) {
    let setup = Setup {
        backend: Arc::new(FakeBackend::default()),
        source: Arc::new(FixedStatus(Mutex::new(status))),
        state: Arc::new(State::new()),
        cancellation: Arc::new(Cancellation::new()),
    };
    let reporter = Arc::new(StatusReporter::new(
        setup.backend.clone(),
        setup.source.clone(),
        setup.state.clone(),
        setup.cancellation.clone(),
        Duration::from_secs(1),
    ));
    (setup, reporter)
}

#[tokio::test]
async fn reports_the_source_status() {
    let (setup, reporter) = setup(TankStatus::TankFailed);
    reporter.report(None, None).await.unwrap();
    assert_eq!(
        setup.backend.tank_claims(),
        vec![("TANK_FAILED".to_string(), None)]
    );
}

#[tokio::test]
async fn idle_with_errors_reports_error_summary() {
    let (setup, reporter) = setup(TankStatus::ReadyForTest);
    setup.state.error("healthcheck", "disk is on fire");
    reporter.report(None, None).await.unwrap();
    let claims = setup.backend.tank_claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].0, "ERROR");
    assert_eq!(claims[0].1.as_deref(), Some("disk is on fire"));
}

#[tokio::test]
async fn busy_tank_reports_status_even_with_errors() {
    let (setup, reporter) = setup(TankStatus::Testing);
    setup.state.error("healthcheck", "disk is on fire");
    reporter.report(None, None).await.unwrap();
    assert_eq!(setup.backend.tank_claims()[0].0, "TESTING");
}

#[tokio::test]
async fn long_messages_are_truncated_in_the_middle() {
    let (setup, reporter) = setup(TankStatus::Testing);
    let long = "m".repeat(20_000);
    reporter
        .report(Some(TankStatus::Testing), Some(long))
        .await
        .unwrap();
    let message = setup.backend.tank_claims()[0].1.clone().unwrap();
    assert_eq!(message.chars().count(), 8000);
    assert!(message.contains("..."));
}

#[tokio::test]
async fn rejection_forces_shutdown() {
    for kind in [
        BackendErrorKind::FailedPrecondition,
        BackendErrorKind::NotFound,
        BackendErrorKind::Unauthorized,
        BackendErrorKind::Unauthenticated,
    ] {
        rejection_forces_shutdown_for(kind).await;
    }
}

async fn rejection_forces_shutdown_for(kind: BackendErrorKind) {
    let (setup, reporter) = setup(TankStatus::ReadyForTest);
    setup
        .backend
        .push_claim_tank_result(Err(BackendError::new(kind, "agent gone")));

    let guard = reporter.run();
    for _ in 0..100 {
        if setup.cancellation.is_set(CancellationLevel::Forced) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(setup.cancellation.is_set(CancellationLevel::Forced));
    assert_eq!(setup.cancellation.explain(), BACKEND_FORGOT_AGENT);

    guard.stop().await;
    let claims = setup.backend.tank_claims();
    let last = claims.last().unwrap();
    assert_eq!(last.0, "STOPPED");
    assert_eq!(last.1.as_deref(), Some(BACKEND_FORGOT_AGENT));
}

#[tokio::test]
async fn transient_errors_keep_the_loop_alive() {
    let (setup, reporter) = setup(TankStatus::ReadyForTest);
    setup
        .backend
        .push_claim_tank_result(Err(BackendError::unavailable("flaky")));

    let guard = reporter.run();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!setup.cancellation.is_set(CancellationLevel::Graceful));
    guard.stop().await;
    // the failed claim, then the final STOPPED claim
    let claims = setup.backend.tank_claims();
    assert!(claims.len() >= 2);
    assert_eq!(claims.last().unwrap().0, "STOPPED");
}
