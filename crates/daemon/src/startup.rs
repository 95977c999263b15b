// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the dependency graph and runs the agent.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use barrage_core::cancellation::Cancellation;
use barrage_core::collections::BoundedQueue;
use barrage_core::config::AgentConfig;
use barrage_core::error::ServiceError;
use barrage_core::fs::Fs;
use barrage_core::labels::LabelContext;
use barrage_core::observer::Observer;
use barrage_core::state::State;

use barrage_adapters::clients::NamedService;
use barrage_adapters::process::ProcessGenerator;
use barrage_adapters::registry::TransportRegistry;
use barrage_engine::fs_observer::{FileSystemObserver, MutationLock};
use barrage_engine::tank::{TankClient, TankVariables};

use crate::api::serve_admin_api;
use crate::artifacts::{ArtifactUploader, LogUploaderService, ObjectStoreUploader};
use crate::healthcheck::HealthCheckService;
use crate::log_pipeline::{
    bootstrap_queue, drain_bootstrap, make_events_reporter, make_log_reporter, LogRecord,
    SinkLayer, SinkRegistry,
};
use crate::registration::register;
use crate::service::{AgentService, AgentServiceConfig};
use crate::status_reporter::StatusReporter;

const DEFAULT_GENERATOR_CMD: &str = "barrage-generator";

/// Handles produced by [`init_logging`], threaded into [`run_serve`].
pub struct LoggingHandles {
    pub registry: SinkRegistry,
    pub bootstrap: Arc<BoundedQueue<LogRecord>>,
    pub labels: Arc<LabelContext>,
}

/// Install the global tracing subscriber with the in-process sink attached.
///
/// Records emitted from here on are cached in the bootstrap queue until the
/// remote log channels exist.
pub fn init_logging(config: &AgentConfig) -> LoggingHandles {
    let registry = SinkRegistry::new();
    let labels = Arc::new(LabelContext::new());
    let bootstrap = bootstrap_queue();
    registry.attach(bootstrap.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.clone().unwrap_or_else(|| "info".to_string()))
    });
    let sink_layer = SinkLayer::new(registry.clone(), labels.clone());

    let file_writer = config.log_path.as_ref().and_then(|path| {
        let path = if path.is_dir() {
            path.join("barrage.log")
        } else {
            path.clone()
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                eprintln!("unable to create log file {}: {e}", path.display());
                None
            }
        }
    });

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
    match file_writer {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .with(sink_layer)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(sink_layer)
                .try_init();
        }
    }

    LoggingHandles {
        registry,
        bootstrap,
        labels,
    }
}

/// Run the agent until cancellation (or until the single configured test
/// finishes) and return the process exit code.
pub async fn run_serve(
    config: AgentConfig,
    cancellation: Arc<Cancellation>,
    logging: LoggingHandles,
) -> Result<i32, ServiceError> {
    let state = Arc::new(State::new());
    let observer = Observer::new(state.clone(), cancellation.clone());
    let fs = Fs::from_config(&config);

    let factory = TransportRegistry::new()
        .create(&config)
        .map_err(|e| ServiceError::Other(e.to_string()))?;

    let agent = register(&config, factory.create_agent_client()).await?;
    let _agent_labels = logging.labels.agent_scope(&agent);

    // remote log channels; early records replay from the bootstrap queue
    let cloud_logs = make_log_reporter(&config, &agent, factory.as_ref());
    let events_logs = make_events_reporter(&config, &agent, factory.as_ref());
    let channels: Vec<_> = [cloud_logs.as_ref(), events_logs.as_ref()]
        .into_iter()
        .flatten()
        .collect();
    for channel in &channels {
        logging.registry.attach(channel.queue.clone());
    }
    drain_bootstrap(&logging.registry, &logging.bootstrap, &channels);
    let mut log_guards = Vec::new();
    for channel in [&cloud_logs, &events_logs].into_iter().flatten() {
        log_guards.push(channel.reporter.run());
    }

    let mutation_lock = Arc::new(MutationLock::new());
    let generator_cmd = config
        .generator_cmd
        .clone()
        .unwrap_or_else(|| DEFAULT_GENERATOR_CMD.to_string());
    let variables = TankVariables {
        token_getter: config.auth_token.clone().map(|token| {
            Arc::new(move || Some(token.clone())) as Arc<dyn Fn() -> Option<String> + Send + Sync>
        }),
        s3_endpoint_url: Some(config.object_storage_url.clone()).filter(|u| !u.is_empty()),
        aws_access_key_id: config.aws_access_key_id.clone(),
        aws_secret_access_key: config.aws_secret_access_key.clone(),
    };
    let tank = Arc::new(TankClient::new(
        fs.clone(),
        config.backend_service_url.clone(),
        Arc::new(ProcessGenerator::new(generator_cmd)),
        factory.create_telemetry_client(&agent),
        variables,
        config.resource_cache_dir.clone(),
        mutation_lock.clone(),
    ));

    let backend = factory.create_backend_client(&agent);
    let uploaders: Vec<NamedService<Arc<dyn ArtifactUploader>>> = vec![
        NamedService::new(
            "cloud logging uploader",
            Arc::new(LogUploaderService::new(
                factory.create_log_client(),
                cancellation.clone(),
            )) as Arc<dyn ArtifactUploader>,
        ),
        NamedService::new(
            "object store uploader",
            Arc::new(ObjectStoreUploader::new(
                factory.create_storage_client(),
                cancellation.clone(),
            )) as Arc<dyn ArtifactUploader>,
        ),
    ];

    let service = Arc::new(AgentService::new(
        AgentServiceConfig::new(
            fs.tmp_dir.clone(),
            Duration::from_secs(config.request_interval.max(1)),
        ),
        backend.clone(),
        factory.create_storage_client(),
        tank,
        uploaders,
        cancellation.clone(),
        state.clone(),
    ));

    let healthcheck = Arc::new(HealthCheckService::new(
        observer,
        vec![Box::new(FileSystemObserver::new(
            fs.clone(),
            Observer::new(state.clone(), cancellation.clone()),
            mutation_lock,
            config.resource_cache_dir.clone(),
        ))],
        Duration::from_secs(config.healthcheck_interval.max(1)),
    ));
    let healthcheck_worker = healthcheck.run();

    let status_reporter = if agent.is_anonymous_external() {
        None
    } else {
        let interval = config
            .reporter_interval
            .unwrap_or(config.request_interval)
            .max(1);
        let reporter = Arc::new(StatusReporter::new(
            backend,
            service.clone(),
            state.clone(),
            cancellation.clone(),
            Duration::from_secs(interval),
        ));
        Some(reporter.run())
    };

    let admin_api = match config.admin_api_port {
        Some(port) => Some(serve_admin_api(state.clone(), cancellation.clone(), port).await?),
        None => None,
    };

    let exit_code = match &config.test_id {
        Some(test_id) => {
            let result = service.serve_single_job(test_id).await;
            match result {
                Ok(job_result) => job_result.exit_code,
                Err(e) => {
                    tracing::error!("single job execution failed: {e}");
                    1
                }
            }
        }
        None => {
            service.serve().await;
            if state.ok() {
                0
            } else {
                1
            }
        }
    };

    if let Some(guard) = status_reporter {
        guard.stop().await;
    }
    healthcheck_worker.stop().await;
    if let Some(api) = admin_api {
        api.stop().await;
    }
    for guard in log_guards {
        guard.stop().await;
    }

    Ok(exit_code)
}
