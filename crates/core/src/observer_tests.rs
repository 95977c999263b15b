// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::{BackendError, ServiceError, TankError};

fn setup() -> (Arc<State>, Arc<Cancellation>, Observer) {
    let state = Arc::new(State::new());
    let cancellation = Arc::new(Cancellation::new());
    let observer = Observer::new(state.clone(), cancellation.clone());
    (state, cancellation, observer)
}

fn boom() -> Result<(), ServiceError> {
    Err(TankError::new("boom").into())
}

#[test]
fn unmatched_error_reraises_untouched() {
    let (state, cancellation, observer) = setup();
    let spec = ObserveSpec::new();
    let result = observer.observe("stage", &spec, boom);
    assert!(result.is_err());
    assert!(state.ok());
    assert!(!cancellation.is_set(CancellationLevel::Graceful));
}

#[test]
fn error_match_stores_and_reraises() {
    let (state, cancellation, observer) = setup();
    let spec = ObserveSpec::new().error(|e| matches!(e, ServiceError::Tank(_)));
    let result = observer.observe("stage", &spec, boom);
    assert!(result.is_err());
    assert!(!state.ok());
    assert!(state.summary_message().contains("boom"));
    assert!(!cancellation.is_set(CancellationLevel::Graceful));
}

#[test]
fn suppress_match_swallows() {
    let (state, cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> = ObserveSpec::new().suppress(|_| true);
    let result = observer.observe("stage", &spec, boom);
    assert!(matches!(result, Ok(None)));
    assert!(state.ok());
    assert!(!cancellation.is_set(CancellationLevel::Graceful));
}

#[test]
fn critical_match_notifies_and_reraises() {
    let (state, cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> = ObserveSpec::new().critical(|_| true);
    let result = observer.observe("stage", &spec, boom);
    assert!(result.is_err());
    assert!(cancellation.is_set(CancellationLevel::Graceful));
    assert!(!cancellation.is_set(CancellationLevel::Forced));
}

#[test]
fn critical_and_suppress_notifies_then_swallows() {
    let (_state, cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> = ObserveSpec::new().critical(|_| true).suppress(|_| true);
    let result = observer.observe("stage", &spec, boom);
    assert!(matches!(result, Ok(None)));
    assert!(cancellation.is_set(CancellationLevel::Graceful));
}

#[test]
fn error_and_suppress_stores_then_swallows() {
    let (state, _cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> =
        ObserveSpec::new().error(|_| true).suppress(|_| true);
    let result = observer.observe("stage", &spec, boom);
    assert!(matches!(result, Ok(None)));
    assert!(!state.ok());
}

#[test]
fn matchers_discriminate_by_error_shape() {
    let (state, _cancellation, observer) = setup();
    let spec = ObserveSpec::new().suppress(|e: &ServiceError| e.is_transient_backend());

    let suppressed = observer.observe("stage", &spec, || {
        Err::<(), _>(BackendError::unavailable("down").into())
    });
    assert!(matches!(suppressed, Ok(None)));

    let raised = observer.observe("other stage", &spec, boom);
    assert!(raised.is_err());
    assert!(state.ok());
}

#[test]
fn cancellation_always_propagates_even_when_suppressed() {
    let (state, _cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> = ObserveSpec::new().suppress(|_| true).error(|_| true);
    let result = observer.observe("stage", &spec, || {
        Err::<(), ServiceError>(CancellationRequest("stop".to_string()).into())
    });
    assert!(matches!(result, Err(ServiceError::Cancelled(_))));
    assert!(state.ok());
}

#[test]
fn forced_cancellation_blocks_entry() {
    let (_state, cancellation, observer) = setup();
    cancellation.notify("shutdown", CancellationLevel::Forced);
    let mut entered = false;
    let result: Result<Option<()>, ServiceError> =
        observer.observe("stage", &ObserveSpec::new(), || {
            entered = true;
            Ok(())
        });
    assert!(matches!(result, Err(ServiceError::Cancelled(_))));
    assert!(!entered);
}

#[test]
fn graceful_cancellation_does_not_block_entry() {
    let (_state, cancellation, observer) = setup();
    cancellation.notify("winding down", CancellationLevel::Graceful);
    let result: Result<Option<i32>, ServiceError> =
        observer.observe("stage", &ObserveSpec::new(), || Ok(7));
    assert!(matches!(result, Ok(Some(7))));
}

#[test]
fn successful_scope_clears_stage_errors() {
    let (state, _cancellation, observer) = setup();
    let spec = ObserveSpec::new().error(|_: &ServiceError| true);
    let _ = observer.observe("stage", &spec, boom);
    assert!(!state.ok());

    let result: Result<Option<()>, ServiceError> =
        observer.observe("stage", &ObserveSpec::new(), || Ok(()));
    assert!(result.is_ok());
    assert!(state.ok());
}

#[test]
fn stage_stack_is_popped_on_error() {
    let (state, _cancellation, observer) = setup();
    let _ = observer.observe("stage", &ObserveSpec::new(), boom);
    assert!(!state.is_alive());
}

#[tokio::test]
async fn async_observe_matches_sync_semantics() {
    let (state, cancellation, observer) = setup();
    let spec: ObserveSpec<ServiceError> = ObserveSpec::new().suppress(|_| true);
    let result = observer
        .observe_async("stage", &spec, async { boom() })
        .await;
    assert!(matches!(result, Ok(None)));
    assert!(state.ok());
    assert!(!cancellation.is_set(CancellationLevel::Graceful));

    cancellation.notify("shutdown", CancellationLevel::Forced);
    let blocked: Result<Option<()>, ServiceError> = observer
        .observe_async("stage", &ObserveSpec::new(), async { Ok(()) })
        .await;
    assert!(matches!(blocked, Err(ServiceError::Cancelled(_))));
}
