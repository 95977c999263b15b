// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process log pipeline: tracing sink → labeling → clamping → remote
//! delivery.
//!
//! A [`SinkLayer`] captures tracing events into bounded queues together with
//! the active [`LabelContext`] labels. A [`LogProcessor`] is the reporter
//! handler that clamps labels and message length per channel and ships the
//! batch through a [`LogClient`]. The bootstrap queue catches records emitted
//! before the agent has an identity; it is drained into the live channels
//! once they exist.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use barrage_core::agent::AgentInfo;
use barrage_core::collections::BoundedQueue;
use barrage_core::config::AgentConfig;
use barrage_core::error::ServiceError;
use barrage_core::labels::LabelContext;
use barrage_core::reporter::{ReportHandler, Reporter, ReporterOptions};
use barrage_core::units::{parse_duration, truncate_string};

use barrage_adapters::clients::{ClientFactory, LogClient, LogMessage, Severity};

/// Bootstrap sink capacity; roughly "everything a startup can say".
const BOOTSTRAP_CAPACITY: usize = 100_000;
const SINK_CAPACITY: usize = 50_000;
const REPORT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_RETENTION: Duration = Duration::from_secs(3 * 3600);
const UNSENT_BUDGET: usize = 1_000_000;

/// Limits of the backend events channel.
pub const EVENTS_MAX_MESSAGE_LENGTH: usize = 2000;
pub const EVENTS_MAX_LABELS_SIZE: usize = 8 * 1024;
/// Limits of the cloud log-group channel.
pub const CLOUD_LOG_MAX_MESSAGE_LENGTH: usize = 64 * 1024;
pub const CLOUD_LOG_MAX_CHUNK_SIZE: usize = 100;

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
    pub context_labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Queues the sink layer currently fans out to.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: Arc<RwLock<Vec<Arc<BoundedQueue<LogRecord>>>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sink: Arc<BoundedQueue<LogRecord>>) {
        self.sinks.write().push(sink);
    }

    pub fn detach(&self, sink: &Arc<BoundedQueue<LogRecord>>) {
        self.sinks.write().retain(|s| !Arc::ptr_eq(s, sink));
    }

    fn push(&self, record: LogRecord) {
        for sink in self.sinks.read().iter() {
            sink.push(record.clone());
        }
    }
}

/// Captures every tracing event into the registered sinks, labeled with the
/// current [`LabelContext`].
pub struct SinkLayer {
    registry: SinkRegistry,
    labels: Arc<LabelContext>,
}

impl SinkLayer {
    pub fn new(registry: SinkRegistry, labels: Arc<LabelContext>) -> Self {
        Self { registry, labels }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        self.registry.push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: collector.message,
            fields: collector.fields,
            context_labels: self.labels.current(),
            created_at: Utc::now(),
        });
    }
}

fn severity(level: Level) -> Severity {
    match level {
        Level::TRACE | Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warning,
        Level::ERROR => Severity::Error,
    }
}

/// Per-channel clamping limits.
#[derive(Debug, Clone)]
pub struct LogProcessorOptions {
    pub max_message_length: usize,
    /// Total byte budget for labels; `None` means unbounded.
    pub max_labels_size: Option<usize>,
    pub max_batch_size: usize,
}

/// Reporter handler rendering records into transport [`LogMessage`]s.
pub struct LogProcessor {
    client: Arc<dyn LogClient>,
    log_group_id: String,
    resource_type: String,
    resource_id: String,
    options: LogProcessorOptions,
}

impl LogProcessor {
    pub fn new(
        client: Arc<dyn LogClient>,
        log_group_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        options: LogProcessorOptions,
    ) -> Self {
        Self {
            client,
            log_group_id: log_group_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            options,
        }
    }

    fn render(&self, record: &LogRecord) -> LogMessage {
        let mut labels: Vec<(String, String)> = record
            .context_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .chain(record.fields.iter().cloned())
            .collect();

        let labels = match self.options.max_labels_size {
            None => labels.into_iter().collect(),
            Some(budget) => {
                // smallest representations first so a single huge value
                // cannot crowd out everything else
                labels.sort_by_key(|(k, v)| k.len() + v.len());
                let mut kept = BTreeMap::new();
                let mut remaining = budget;
                for (key, value) in labels {
                    if key.len() >= remaining {
                        break;
                    }
                    let available = remaining - key.len();
                    if value.len() <= available {
                        remaining -= key.len() + value.len();
                        kept.insert(key, value);
                    } else {
                        let truncated: String = value.chars().take(available).collect();
                        kept.insert(key, truncated);
                        break;
                    }
                }
                kept
            }
        };

        LogMessage {
            message: truncate_string(&record.message, self.options.max_message_length, true),
            labels,
            severity: severity(record.level),
            created_at: record.created_at,
        }
    }
}

#[async_trait]
impl ReportHandler<LogRecord> for LogProcessor {
    async fn handle(&self, _request_id: &str, batch: Vec<LogRecord>) -> Result<(), ServiceError> {
        let messages: Vec<LogMessage> = batch.iter().map(|record| self.render(record)).collect();
        self.client
            .send_log(
                &self.log_group_id,
                &messages,
                &self.resource_type,
                &self.resource_id,
            )
            .await
            .map_err(ServiceError::from)
    }

    fn on_error(&self, error: &ServiceError) {
        tracing::warn!(
            "failed to send logs to {}: {error}",
            if self.log_group_id.is_empty() {
                "events log"
            } else {
                self.log_group_id.as_str()
            }
        );
    }

    fn max_batch_size(&self) -> usize {
        self.options.max_batch_size
    }
}

/// A live log channel: the reporter plus the sink queue feeding it.
pub struct LogChannel {
    pub reporter: Arc<Reporter<LogRecord>>,
    pub queue: Arc<BoundedQueue<LogRecord>>,
}

fn retention(config: &AgentConfig) -> Duration {
    config
        .log_retention_period
        .as_deref()
        .and_then(|raw| parse_duration(raw).ok())
        .unwrap_or(DEFAULT_RETENTION)
}

fn channel(handler: LogProcessor, config: &AgentConfig) -> LogChannel {
    let batch = handler.max_batch_size().max(1);
    let reporter = Arc::new(Reporter::new(
        vec![Box::new(handler) as Box<dyn ReportHandler<LogRecord>>],
        ReporterOptions {
            retention_period: retention(config),
            report_interval: REPORT_INTERVAL,
            max_unsent_size: UNSENT_BUDGET / batch,
            exponential_backoff: true,
        },
    ));
    let queue = Arc::new(BoundedQueue::new(SINK_CAPACITY));
    reporter.add_source(queue.clone());
    LogChannel { reporter, queue }
}

/// Cloud log-group channel; `None` when the agent is anonymous or no log
/// group is configured.
pub fn make_log_reporter(
    config: &AgentConfig,
    agent: &AgentInfo,
    factory: &dyn ClientFactory,
) -> Option<LogChannel> {
    let log_group_id = config.log_group_id.clone().filter(|id| !id.is_empty())?;
    let agent_id = agent.id.clone().filter(|id| !id.is_empty())?;
    let handler = LogProcessor::new(
        factory.create_log_client(),
        log_group_id,
        "agent_logs",
        agent_id,
        LogProcessorOptions {
            max_message_length: CLOUD_LOG_MAX_MESSAGE_LENGTH,
            max_labels_size: None,
            max_batch_size: CLOUD_LOG_MAX_CHUNK_SIZE,
        },
    );
    Some(channel(handler, config))
}

/// Backend events channel; `None` for anonymous agents.
pub fn make_events_reporter(
    config: &AgentConfig,
    agent: &AgentInfo,
    factory: &dyn ClientFactory,
) -> Option<LogChannel> {
    let agent_id = agent.id.clone().filter(|id| !id.is_empty())?;
    let handler = LogProcessor::new(
        factory.create_events_log_client(agent),
        "",
        "events",
        agent_id,
        LogProcessorOptions {
            max_message_length: EVENTS_MAX_MESSAGE_LENGTH,
            max_labels_size: Some(EVENTS_MAX_LABELS_SIZE),
            max_batch_size: config.log_max_chunk_size,
        },
    );
    Some(channel(handler, config))
}

/// Create the bootstrap queue used before the identity is known.
pub fn bootstrap_queue() -> Arc<BoundedQueue<LogRecord>> {
    Arc::new(BoundedQueue::new(BOOTSTRAP_CAPACITY))
}

/// Replay the bootstrap records into the live channels and retire the
/// bootstrap sink.
pub fn drain_bootstrap(
    registry: &SinkRegistry,
    bootstrap: &Arc<BoundedQueue<LogRecord>>,
    channels: &[&LogChannel],
) {
    registry.detach(bootstrap);
    for record in bootstrap.drain() {
        for channel in channels {
            channel.queue.push(record.clone());
        }
    }
}

#[cfg(test)]
#[path = "log_pipeline_tests.rs"]
mod tests;
