// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use barrage_core::error::BackendErrorKind;
use parking_lot::Mutex;
use std::sync::Arc;

fn policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn returns_first_success() {
    let calls = Arc::new(Mutex::new(0u32));
    let result = retry_call(&policy(), |_meta| {
        let calls = calls.clone();
        async move {
            *calls.lock() += 1;
            Ok::<_, BackendError>(42)
        }
    })
    .await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(*calls.lock(), 1);
}

#[tokio::test]
async fn retries_retryable_kinds_up_to_limit() {
    let calls = Arc::new(Mutex::new(0u32));
    let result: Result<(), _> = retry_call(&policy(), |_meta| {
        let calls = calls.clone();
        async move {
            *calls.lock() += 1;
            Err(BackendError::new(BackendErrorKind::Aborted, "try again"))
        }
    })
    .await;
    assert_eq!(result.unwrap_err().kind, BackendErrorKind::Aborted);
    assert_eq!(*calls.lock(), 3);
}

#[tokio::test]
async fn does_not_retry_terminal_kinds() {
    let calls = Arc::new(Mutex::new(0u32));
    let result: Result<(), _> = retry_call(&policy(), |_meta| {
        let calls = calls.clone();
        async move {
            *calls.lock() += 1;
            Err(BackendError::not_found("gone"))
        }
    })
    .await;
    assert_eq!(result.unwrap_err().kind, BackendErrorKind::NotFound);
    assert_eq!(*calls.lock(), 1);
}

#[tokio::test]
async fn recovers_after_transient_failure() {
    let calls = Arc::new(Mutex::new(0u32));
    let result = retry_call(&policy(), |_meta| {
        let calls = calls.clone();
        async move {
            let mut calls = calls.lock();
            *calls += 1;
            if *calls < 3 {
                Err(BackendError::new(BackendErrorKind::Unavailable, "down"))
            } else {
                Ok("ok")
            }
        }
    })
    .await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(*calls.lock(), 3);
}

#[tokio::test]
async fn request_id_is_fresh_per_attempt_trace_id_stable() {
    let metas = Arc::new(Mutex::new(Vec::<RequestMeta>::new()));
    let _: Result<(), _> = retry_call(&policy(), |meta| {
        let metas = metas.clone();
        async move {
            metas.lock().push(meta);
            Err(BackendError::new(BackendErrorKind::Unknown, "boom"))
        }
    })
    .await;
    let metas = metas.lock();
    assert_eq!(metas.len(), 3);
    assert_eq!(metas[0].trace_id, metas[1].trace_id);
    assert_eq!(metas[1].trace_id, metas[2].trace_id);
    assert_ne!(metas[0].request_id, metas[1].request_id);
    assert_ne!(metas[1].request_id, metas[2].request_id);
}
