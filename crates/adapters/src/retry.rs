// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry for control-plane calls.

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use barrage_core::error::BackendError;

/// Retry policy of the control-plane RPC layer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Per-attempt request identity stamped onto outgoing calls.
///
/// The trace id is stable across retries of one logical call; the request id
/// is fresh for every attempt.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub trace_id: String,
}

/// Run `call` with up to `policy.attempts` tries, retrying retryable backend
/// kinds with a fixed backoff.
pub async fn retry_call<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, BackendError>
where
    F: FnMut(RequestMeta) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let trace_id = Uuid::new_v4().to_string();
    let attempts = policy.attempts.max(1);
    let mut last_error = None;
    for attempt in 0..attempts {
        let meta = RequestMeta {
            request_id: Uuid::new_v4().to_string(),
            trace_id: trace_id.clone(),
        };
        match call(meta).await {
            Ok(value) => return Ok(value),
            Err(error) if error.kind.is_retryable() && attempt + 1 < attempts => {
                tracing::debug!(
                    attempt,
                    kind = %error.kind,
                    "retrying backend call: {}",
                    error.message
                );
                tokio::time::sleep(policy.backoff).await;
                last_error = Some(error);
            }
            Err(error) => return Err(error),
        }
    }
    Err(last_error.unwrap_or_else(|| BackendError::internal("retry loop exhausted")))
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
