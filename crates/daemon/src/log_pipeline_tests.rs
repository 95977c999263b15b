// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use barrage_adapters::fake::{FakeClientFactory, FakeLogClient};
use barrage_core::agent::AgentOrigin;
use tracing_subscriber::prelude::*;

fn record(message: &str) -> LogRecord {
    LogRecord {
        level: Level::INFO,
        target: "test".to_string(),
        message: message.to_string(),
        fields: Vec::new(),
        context_labels: BTreeMap::new(),
        created_at: Utc::now(),
    }
}

fn agent(id: Option<&str>) -> AgentInfo {
    AgentInfo {
        id: id.map(str::to_string),
        name: Some("agent-1".to_string()),
        version: Some("0.2.0".to_string()),
        origin: AgentOrigin::External,
        folder_id: Some("folder".to_string()),
    }
}

fn events_processor(client: Arc<FakeLogClient>) -> LogProcessor {
    LogProcessor::new(
        client,
        "lg-1",
        "agent_logs",
        "agt-1",
        LogProcessorOptions {
            max_message_length: EVENTS_MAX_MESSAGE_LENGTH,
            max_labels_size: Some(EVENTS_MAX_LABELS_SIZE),
            max_batch_size: 100,
        },
    )
}

#[test]
fn sink_layer_captures_events_with_context_labels() {
    let registry = SinkRegistry::new();
    let queue = Arc::new(BoundedQueue::new(100));
    registry.attach(queue.clone());
    let labels = Arc::new(LabelContext::new());
    let _scope = labels.scope(
        [("job_id".to_string(), "j-1".to_string())]
            .into_iter()
            .collect(),
    );

    let subscriber =
        tracing_subscriber::registry().with(SinkLayer::new(registry.clone(), labels.clone()));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(attempt = 3, "downloading ammo {}", "payload");
        tracing::error!("boom");
    });

    let records = queue.drain();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].message, "downloading ammo payload");
    assert_eq!(records[0].level, Level::INFO);
    assert_eq!(
        records[0].context_labels.get("job_id").map(String::as_str),
        Some("j-1")
    );
    assert!(records[0]
        .fields
        .iter()
        .any(|(k, v)| k == "attempt" && v == "3"));
    assert_eq!(records[1].level, Level::ERROR);
}

#[test]
fn detached_sinks_stop_receiving() {
    let registry = SinkRegistry::new();
    let queue = Arc::new(BoundedQueue::new(100));
    registry.attach(queue.clone());
    registry.detach(&queue);
    let labels = Arc::new(LabelContext::new());
    let subscriber = tracing_subscriber::registry().with(SinkLayer::new(registry, labels));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("dropped");
    });
    assert!(queue.is_empty());
}

#[test]
fn render_truncates_long_messages_in_the_middle() {
    let client = Arc::new(FakeLogClient::default());
    let processor = events_processor(client);
    let long = "1234567890".repeat(205);
    let message = processor.render(&record(&long));
    assert_eq!(message.message.chars().count(), EVENTS_MAX_MESSAGE_LENGTH);
    assert!(message.message.contains("..."));
}

#[test]
fn render_maps_levels_to_severity() {
    let client = Arc::new(FakeLogClient::default());
    let processor = events_processor(client);
    for (level, expected) in [
        (Level::DEBUG, Severity::Debug),
        (Level::INFO, Severity::Info),
        (Level::WARN, Severity::Warning),
        (Level::ERROR, Severity::Error),
    ] {
        let mut r = record("msg");
        r.level = level;
        assert_eq!(processor.render(&r).severity, expected);
    }
}

#[test]
fn label_budget_truncates_the_first_overflowing_value() {
    let client = Arc::new(FakeLogClient::default());
    let processor = LogProcessor::new(
        client,
        "lg-1",
        "agent_logs",
        "agt-1",
        LogProcessorOptions {
            max_message_length: 2000,
            max_labels_size: Some(32),
            max_batch_size: 100,
        },
    );
    let mut r = record("msg");
    r.fields = vec![
        ("a".to_string(), "1".to_string()),
        ("big".to_string(), "x".repeat(100)),
        ("b".to_string(), "2".to_string()),
    ];
    let message = processor.render(&r);
    // small labels kept whole, the oversized value clipped to the budget
    assert_eq!(message.labels.get("a").map(String::as_str), Some("1"));
    assert_eq!(message.labels.get("b").map(String::as_str), Some("2"));
    let clipped = message.labels.get("big").unwrap();
    assert!(clipped.len() < 100);
    let total: usize = message
        .labels
        .iter()
        .map(|(k, v)| k.len() + v.len())
        .sum();
    assert!(total <= 32);
}

#[test]
fn unbounded_labels_keep_everything() {
    let client = Arc::new(FakeLogClient::default());
    let processor = LogProcessor::new(
        client,
        "lg-1",
        "agent_logs",
        "agt-1",
        LogProcessorOptions {
            max_message_length: CLOUD_LOG_MAX_MESSAGE_LENGTH,
            max_labels_size: None,
            max_batch_size: CLOUD_LOG_MAX_CHUNK_SIZE,
        },
    );
    let mut r = record("msg");
    r.fields = vec![("big".to_string(), "x".repeat(100_000))];
    let message = processor.render(&r);
    assert_eq!(message.labels.get("big").map(String::len), Some(100_000));
}

#[test]
fn channels_require_identity() {
    let factory = FakeClientFactory::default();
    let mut config = AgentConfig::default();
    config.log_group_id = Some("lg-1".to_string());

    assert!(make_log_reporter(&config, &agent(None), &factory).is_none());
    assert!(make_events_reporter(&config, &agent(None), &factory).is_none());
    assert!(make_log_reporter(&config, &agent(Some("agt-1")), &factory).is_some());
    assert!(make_events_reporter(&config, &agent(Some("agt-1")), &factory).is_some());

    config.log_group_id = None;
    assert!(make_log_reporter(&config, &agent(Some("agt-1")), &factory).is_none());
}

#[tokio::test]
async fn channel_ships_queued_records() {
    let factory = FakeClientFactory::default();
    let mut config = AgentConfig::default();
    config.log_group_id = Some("lg-1".to_string());
    let channel = make_log_reporter(&config, &agent(Some("agt-1")), &factory).unwrap();

    channel.queue.push(record("first"));
    channel.queue.push(record("second"));
    channel.reporter.report(false).await;

    let calls = factory.log_client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].log_group_id, "lg-1");
    assert_eq!(calls[0].resource_type, "agent_logs");
    assert_eq!(calls[0].resource_id, "agt-1");
    let texts: Vec<&str> = calls[0]
        .messages
        .iter()
        .map(|m| m.message.as_str())
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn bootstrap_records_reach_every_channel() {
    let factory = FakeClientFactory::default();
    let mut config = AgentConfig::default();
    config.log_group_id = Some("lg-1".to_string());
    let agent = agent(Some("agt-1"));

    let registry = SinkRegistry::new();
    let bootstrap = bootstrap_queue();
    registry.attach(bootstrap.clone());
    bootstrap.push(record("early message"));

    let cloud = make_log_reporter(&config, &agent, &factory).unwrap();
    let events = make_events_reporter(&config, &agent, &factory).unwrap();
    drain_bootstrap(&registry, &bootstrap, &[&cloud, &events]);

    cloud.reporter.report(false).await;
    events.reporter.report(false).await;

    assert_eq!(factory.log_client.calls().len(), 1);
    assert_eq!(
        factory.log_client.calls()[0].messages[0].message,
        "early message"
    );
    assert_eq!(factory.events_log_client.calls().len(), 1);
    assert!(bootstrap.is_empty());
}
