// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local admin HTTP API: `/health` and `/shutdown`.
//!
//! Binds `127.0.0.1` and `::1` independently; losing one stack is logged,
//! losing both is fatal.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use barrage_core::cancellation::{Cancellation, CancellationLevel};
use barrage_core::error::ServiceError;
use barrage_core::state::State as AgentState;

/// Coarse liveness of the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLiveness {
    Alive,
    ShuttingDown,
    Shutdown,
}

impl ServiceLiveness {
    pub fn name(self) -> &'static str {
        match self {
            ServiceLiveness::Alive => "ALIVE",
            ServiceLiveness::ShuttingDown => "SHUTTING_DOWN",
            ServiceLiveness::Shutdown => "SHUTDOWN",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub state: ServiceLiveness,
    pub errors: Vec<String>,
    pub current_activity: String,
}

#[derive(Clone)]
struct ApiContext {
    state: Arc<AgentState>,
    cancellation: Arc<Cancellation>,
}

impl ApiContext {
    fn liveness(&self) -> ServiceLiveness {
        if !self.state.is_alive() {
            ServiceLiveness::Shutdown
        } else if self.cancellation.is_set(CancellationLevel::Graceful) {
            ServiceLiveness::ShuttingDown
        } else {
            ServiceLiveness::Alive
        }
    }
}

async fn get_health(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let errors = ctx
        .state
        .current_errors()
        .into_iter()
        .map(|e| e.message)
        .collect();
    let stack = ctx.state.current_stack();
    let current_activity = if stack.is_empty() {
        "idle".to_string()
    } else {
        stack.join(" -> ")
    };
    Json(HealthResponse {
        state: ctx.liveness(),
        errors,
        current_activity,
    })
}

async fn shutdown(
    State(ctx): State<ApiContext>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let forced = params.get("force").is_some_and(|v| !v.is_empty());
    let level = if forced {
        CancellationLevel::Forced
    } else {
        CancellationLevel::Graceful
    };
    ctx.cancellation.notify("requested from api", level);
    let liveness = ctx.liveness();
    let code = if liveness == ServiceLiveness::Shutdown {
        StatusCode::OK
    } else {
        StatusCode::PROCESSING
    };
    (code, liveness.name().to_string())
}

pub fn router(state: Arc<AgentState>, cancellation: Arc<Cancellation>) -> Router {
    let ctx = ApiContext {
        state,
        cancellation,
    };
    Router::new()
        .route("/health", get(get_health))
        .route("/shutdown", get(shutdown).post(shutdown))
        .with_state(ctx)
}

/// Running admin listeners; aborted via the stop token.
pub struct AdminApi {
    handles: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

impl AdminApi {
    pub async fn stop(self) {
        self.token.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Bind the admin API on both loopback stacks.
pub async fn serve_admin_api(
    state: Arc<AgentState>,
    cancellation: Arc<Cancellation>,
    port: u16,
) -> Result<AdminApi, ServiceError> {
    let app = router(state, cancellation);
    let token = CancellationToken::new();
    let mut handles = Vec::new();

    for address in [format!("127.0.0.1:{port}"), format!("[::1]:{port}")] {
        match tokio::net::TcpListener::bind(&address).await {
            Ok(listener) => {
                tracing::info!("admin api listening on {address}");
                let app = app.clone();
                let token = token.clone();
                handles.push(tokio::spawn(async move {
                    let shutdown = token.cancelled_owned();
                    if let Err(e) = axum::serve(listener, app)
                        .with_graceful_shutdown(shutdown)
                        .await
                    {
                        tracing::error!("admin api server on {address} failed: {e}");
                    }
                }));
            }
            Err(e) => {
                tracing::warn!("failed to bind admin api at {address}: {e}");
            }
        }
    }

    if handles.is_empty() {
        return Err(ServiceError::Other(format!(
            "failed to start admin api listeners on port {port}"
        )));
    }
    Ok(AdminApi { handles, token })
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
