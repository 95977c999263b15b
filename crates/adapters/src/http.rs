// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default JSON-over-HTTP transport.
//!
//! Endpoint layout (relative to `backend_service_url`):
//!
//! - `POST agents/register` / `POST agents/external/register`
//! - `GET  jobs?agent_instance_id=…[&job_id=…]` (204/404 → no job)
//! - `GET  jobs/{id}/signal`
//! - `POST agents/{id}/status`, `POST jobs/{id}/status`
//! - `GET  jobs/{id}/files/{name}`
//! - `POST agents/{id}/events`
//! - `POST jobs/{id}/trails`, `POST jobs/{id}/monitorings`,
//!   `POST tests/{id}/imbalance`
//!
//! Log groups are written under `logging_service_url`
//! (`POST log-groups/{id}/write`); the object store is addressed as
//! `{object_storage_url}/{bucket}/{key}` with plain GET/PUT.
//!
//! Every call is retried per [`RetryPolicy`] and stamped with
//! `x-client-request-id` (fresh per attempt) and `x-client-trace-id`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use barrage_core::agent::AgentInfo;
use barrage_core::config::AgentConfig;
use barrage_core::error::{BackendError, BackendErrorKind, ObjectStorageError};

use crate::clients::{
    AgentClient, BackendClient, ClientFactory, JobMessage, JobSignal, LogClient, LogMessage,
    StorageClient, StorageObject, TelemetryClient,
};
use crate::generator::{MonitoringChunk, TrailItem};
use crate::retry::{retry_call, RequestMeta, RetryPolicy};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_CALL_TIMEOUT: Duration = Duration::from_secs(10);

fn kind_for_status(status: reqwest::StatusCode) -> BackendErrorKind {
    match status.as_u16() {
        400 => BackendErrorKind::InvalidArgument,
        401 => BackendErrorKind::Unauthenticated,
        403 => BackendErrorKind::PermissionDenied,
        404 => BackendErrorKind::NotFound,
        409 => BackendErrorKind::Aborted,
        412 => BackendErrorKind::FailedPrecondition,
        429 => BackendErrorKind::TooManyRequests,
        500 => BackendErrorKind::Internal,
        502 | 504 => BackendErrorKind::GatewayTimeout,
        503 => BackendErrorKind::Unavailable,
        _ => BackendErrorKind::Unknown,
    }
}

/// One authenticated HTTP endpoint.
#[derive(Clone)]
struct Channel {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
    agent_version: Option<String>,
}

impl Channel {
    fn new(
        http: reqwest::Client,
        base: &str,
        token: Option<String>,
        agent_version: Option<String>,
    ) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
            agent_version,
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        meta: &RequestMeta,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base, path);
        let mut builder = self
            .http
            .request(method, url)
            .header("x-client-request-id", &meta.request_id)
            .header("x-client-trace-id", &meta.trace_id);
        if let Some(version) = &self.agent_version {
            builder = builder.header("x-agent-version", version);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::new(kind_for_status(status), body))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        meta: &RequestMeta,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .send(self.request(reqwest::Method::POST, path, meta).json(body))
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::internal(format!("malformed response: {e}")))
    }

    async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        meta: &RequestMeta,
        body: &B,
    ) -> Result<(), BackendError> {
        self.send(self.request(reqwest::Method::POST, path, meta).json(body))
            .await
            .map(|_| ())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        meta: &RequestMeta,
    ) -> Result<Option<T>, BackendError> {
        let response = self
            .send(self.request(reqwest::Method::GET, path, meta))
            .await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| BackendError::internal(format!("malformed response: {e}")))
    }

    async fn get_bytes(&self, path: &str, meta: &RequestMeta) -> Result<Vec<u8>, BackendError> {
        let response = self
            .send(self.request(reqwest::Method::GET, path, meta))
            .await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BackendError::internal(format!("truncated response: {e}")))
    }
}

/// Factory for the built-in HTTP transport.
pub struct HttpClientFactory {
    http: reqwest::Client,
    log_http: reqwest::Client,
    config: AgentConfig,
}

impl HttpClientFactory {
    pub fn new(config: &AgentConfig) -> Result<Self, String> {
        if config.backend_service_url.is_empty() {
            return Err("backend_service_url must be set for the http transport".to_string());
        }
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;
        let log_http = reqwest::Client::builder()
            .timeout(LOG_CALL_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            http,
            log_http,
            config: config.clone(),
        })
    }

    fn backend_channel(&self, agent: Option<&AgentInfo>) -> Channel {
        Channel::new(
            self.http.clone(),
            &self.config.backend_service_url,
            self.config.auth_token.clone(),
            agent.and_then(|a| a.version.clone()),
        )
    }
}

impl ClientFactory for HttpClientFactory {
    fn create_agent_client(&self) -> Arc<dyn AgentClient> {
        Arc::new(HttpAgentClient {
            channel: self.backend_channel(None),
            compute_instance_id: self.config.compute_instance_id.clone(),
            retry: RetryPolicy::default(),
        })
    }

    fn create_backend_client(&self, agent: &AgentInfo) -> Arc<dyn BackendClient> {
        Arc::new(HttpBackendClient {
            channel: self.backend_channel(Some(agent)),
            agent_id: agent.id_str().to_string(),
            retry: RetryPolicy::default(),
        })
    }

    fn create_telemetry_client(&self, agent: &AgentInfo) -> Arc<dyn TelemetryClient> {
        Arc::new(HttpTelemetryClient {
            channel: self.backend_channel(Some(agent)),
            agent_id: agent.id_str().to_string(),
            retry: RetryPolicy::default(),
        })
    }

    fn create_storage_client(&self) -> Arc<dyn StorageClient> {
        Arc::new(HttpStorageClient {
            channel: Channel::new(
                self.http.clone(),
                &self.config.object_storage_url,
                self.config.auth_token.clone(),
                None,
            ),
        })
    }

    fn create_log_client(&self) -> Arc<dyn LogClient> {
        Arc::new(HttpLogClient {
            channel: Channel::new(
                self.log_http.clone(),
                &self.config.logging_service_url,
                self.config.auth_token.clone(),
                None,
            ),
            retry: RetryPolicy::default(),
        })
    }

    fn create_events_log_client(&self, agent: &AgentInfo) -> Arc<dyn LogClient> {
        Arc::new(HttpEventsLogClient {
            backend: HttpBackendClient {
                channel: self.backend_channel(Some(agent)),
                agent_id: agent.id_str().to_string(),
                retry: RetryPolicy::default(),
            },
        })
    }
}

struct HttpAgentClient {
    channel: Channel,
    compute_instance_id: Option<String>,
    retry: RetryPolicy,
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn register_agent(&self) -> Result<String, BackendError> {
        let channel = self.channel.clone();
        let body = json!({ "compute_instance_id": self.compute_instance_id });
        let response: serde_json::Value = retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let body = body.clone();
            async move { channel.post_json("agents/register", &meta, &body).await }
        })
        .await?;
        agent_id_from(&response)
    }

    async fn register_external_agent(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<String, BackendError> {
        let channel = self.channel.clone();
        let body = json!({ "folder_id": folder_id, "name": name });
        let response: serde_json::Value = retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let body = body.clone();
            async move {
                channel
                    .post_json("agents/external/register", &meta, &body)
                    .await
            }
        })
        .await?;
        agent_id_from(&response)
    }
}

fn agent_id_from(response: &serde_json::Value) -> Result<String, BackendError> {
    response
        .get("agent_instance_id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::internal("registration response missing agent_instance_id"))
}

struct HttpBackendClient {
    channel: Channel,
    agent_id: String,
    retry: RetryPolicy,
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn get_job(&self, job_id: Option<&str>) -> Result<Option<JobMessage>, BackendError> {
        let channel = self.channel.clone();
        let mut path = format!("jobs?agent_instance_id={}", self.agent_id);
        if let Some(job_id) = job_id {
            path.push_str(&format!("&job_id={job_id}"));
        }
        let result = retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            async move { channel.get_json::<JobMessage>(&path, &meta).await }
        })
        .await;
        match result {
            Ok(message) => Ok(message.filter(|m| !m.id.is_empty())),
            Err(e) if e.kind == BackendErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_job_signal(&self, job_id: &str) -> Result<JobSignal, BackendError> {
        let channel = self.channel.clone();
        let path = format!("jobs/{job_id}/signal");
        let response: Option<serde_json::Value> = retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            async move { channel.get_json(&path, &meta).await }
        })
        .await?;
        let Some(response) = response else {
            return Ok(JobSignal::Unspecified);
        };
        let name = response
            .get("signal")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("SIGNAL_UNSPECIFIED");
        Ok(match name {
            "SIGNAL_UNSPECIFIED" => JobSignal::Unspecified,
            "WAIT" => JobSignal::Wait,
            "STOP" => JobSignal::Stop,
            "RUN_IN" => JobSignal::RunIn {
                seconds: response
                    .get("run_in")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0),
            },
            other => JobSignal::Other(other.to_string()),
        })
    }

    async fn claim_tank_status(
        &self,
        status: &str,
        status_message: Option<&str>,
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("agents/{}/status", self.agent_id);
        let body = json!({ "status": status, "status_message": status_message });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }

    async fn claim_job_status(
        &self,
        job_id: &str,
        status: &str,
        error: Option<&str>,
        error_type: Option<&str>,
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("jobs/{job_id}/status");
        let body = json!({ "status": status, "error": error, "error_type": error_type });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }

    async fn download_transient_ammo(
        &self,
        job_id: &str,
        name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let url_path = format!("jobs/{job_id}/files/{name}");
        let data = retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let url_path = url_path.clone();
            async move { channel.get_bytes(&url_path, &meta).await }
        })
        .await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::internal(e.to_string()))?;
        }
        tokio::fs::write(path, data)
            .await
            .map_err(|e| BackendError::internal(e.to_string()))
    }

    async fn report_event_logs(
        &self,
        idempotency_key: &str,
        events: &[LogMessage],
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("agents/{}/events", self.agent_id);
        let body = json!({ "idempotency_key": idempotency_key, "events": events });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }
}

struct HttpTelemetryClient {
    channel: Channel,
    agent_id: String,
    retry: RetryPolicy,
}

#[async_trait]
impl TelemetryClient for HttpTelemetryClient {
    async fn send_trails(&self, job_id: &str, trails: &[TrailItem]) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("jobs/{job_id}/trails");
        let body = json!({ "agent_instance_id": self.agent_id, "trails": trails });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }

    async fn send_monitorings(
        &self,
        job_id: &str,
        chunks: &[MonitoringChunk],
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("jobs/{job_id}/monitorings");
        let body = json!({ "agent_instance_id": self.agent_id, "chunks": chunks });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }

    async fn set_imbalance_and_dsc(
        &self,
        job_id: &str,
        rps: u64,
        timestamp: i64,
        comment: &str,
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("tests/{job_id}/imbalance");
        // the update mask mirrors which fields were actually supplied
        let mut mask = vec!["imbalance_point", "imbalance_comment"];
        if timestamp != 0 {
            mask.push("imbalance_ts");
        }
        let body = json!({
            "imbalance_point": rps,
            "imbalance_ts": timestamp,
            "imbalance_comment": comment,
            "update_mask": mask,
        });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }
}

struct HttpLogClient {
    channel: Channel,
    retry: RetryPolicy,
}

#[async_trait]
impl LogClient for HttpLogClient {
    async fn send_log(
        &self,
        log_group_id: &str,
        messages: &[LogMessage],
        resource_type: &str,
        resource_id: &str,
    ) -> Result<(), BackendError> {
        let channel = self.channel.clone();
        let path = format!("log-groups/{log_group_id}/write");
        let body = json!({
            "resource_type": resource_type,
            "resource_id": resource_id,
            "messages": messages,
        });
        retry_call(&self.retry, |meta| {
            let channel = channel.clone();
            let path = path.clone();
            let body = body.clone();
            async move { channel.post_unit(&path, &meta, &body).await }
        })
        .await
    }
}

/// Ships log batches through the backend's event-log endpoint.
struct HttpEventsLogClient {
    backend: HttpBackendClient,
}

#[async_trait]
impl LogClient for HttpEventsLogClient {
    async fn send_log(
        &self,
        _log_group_id: &str,
        messages: &[LogMessage],
        _resource_type: &str,
        _resource_id: &str,
    ) -> Result<(), BackendError> {
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        self.backend
            .report_event_logs(&idempotency_key, messages)
            .await
    }
}

struct HttpStorageClient {
    channel: Channel,
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn download(
        &self,
        object: &StorageObject,
        path: &Path,
    ) -> Result<(), ObjectStorageError> {
        let meta = RequestMeta {
            request_id: uuid::Uuid::new_v4().to_string(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        };
        let url_path = format!("{}/{}", object.bucket, object.key);
        let data = self
            .channel
            .get_bytes(&url_path, &meta)
            .await
            .map_err(|e| ObjectStorageError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStorageError(e.to_string()))?;
        }
        tokio::fs::write(path, data)
            .await
            .map_err(|e| ObjectStorageError(e.to_string()))
    }

    async fn upload(&self, source: &Path, key: &str, bucket: &str) -> Result<(), ObjectStorageError> {
        let meta = RequestMeta {
            request_id: uuid::Uuid::new_v4().to_string(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        };
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| ObjectStorageError(e.to_string()))?;
        let builder = self
            .channel
            .request(reqwest::Method::PUT, &format!("{bucket}/{key}"), &meta)
            .body(data);
        self.channel
            .send(builder)
            .await
            .map(|_| ())
            .map_err(|e| ObjectStorageError(e.to_string()))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
