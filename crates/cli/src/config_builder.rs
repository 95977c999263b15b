// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration: defaults → config file → environment → CLI flags.

use std::path::Path;

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use barrage_core::config::AgentConfig;

use crate::args::{Cli, Command};

/// Environment variables recognized by the agent, mapped onto config fields.
const ENV_FIELDS: &[(&str, &str)] = &[
    ("LOADTESTING_TRANSPORT", "transport"),
    ("LOADTESTING_ENVIRONMENT", "environment"),
    ("LOADTESTING_BACKEND_SERVICE_URL", "backend_service_url"),
    ("LOADTESTING_IAM_SERVICE_URL", "iam_service_url"),
    ("LOADTESTING_LOGGING_SERVICE_URL", "logging_service_url"),
    ("LOADTESTING_OBJECT_STORAGE_URL", "object_storage_url"),
    ("LOADTESTING_AGENT_NAME", "agent_name"),
    ("LOADTESTING_FOLDER_ID", "folder_id"),
    ("LOADTESTING_AGENT_ID_FILE", "agent_id_file"),
    ("LOADTESTING_WORK_DIR", "work_dir"),
    ("LOADTESTING_LOCK_DIR", "lock_dir"),
    ("LOADTESTING_LOG_PATH", "log_path"),
    ("LOADTESTING_LOG_LEVEL", "log_level"),
    ("LOADTESTING_LOG_GROUP_ID", "log_group_id"),
    ("LOADTESTING_AUTH_TOKEN", "auth_token"),
    ("LOADTESTING_GENERATOR_CMD", "generator_cmd"),
];
const ENV_NO_CACHE: &str = "LOADTESTING_NO_CACHE";
const ENV_REQUEST_INTERVAL: &str = "LOADTESTING_REQUEST_INTERVAL";
const ENV_ADMIN_API_PORT: &str = "LOADTESTING_ADMIN_API_PORT";

/// Resolve the effective configuration for this invocation.
pub fn build_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let mut layers = serde_json::to_value(AgentConfig::default())
        .context("default config is not serializable")?;

    if let Some(path) = &cli.config {
        merge(&mut layers, file_layer(path)?);
    }
    merge(&mut layers, env_layer()?);
    merge(&mut layers, cli_layer(cli)?);

    let mut config: AgentConfig =
        serde_json::from_value(layers).context("invalid configuration")?;
    config.request_interval = config.request_interval.max(1);
    config
        .validate_labels()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(config)
}

fn file_layer(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("config file {} is not valid YAML", path.display()))?;
    serde_json::to_value(yaml)
        .with_context(|| format!("config file {} has an unsupported shape", path.display()))
}

fn env_layer() -> anyhow::Result<Value> {
    let mut layer = Map::new();
    for (env_name, field) in ENV_FIELDS {
        if let Ok(value) = std::env::var(env_name) {
            if !value.is_empty() {
                layer.insert(field.to_string(), Value::String(value));
            }
        }
    }
    if let Ok(value) = std::env::var(ENV_NO_CACHE) {
        let truthy = !matches!(value.as_str(), "" | "0" | "false" | "no");
        layer.insert("no_cache".to_string(), Value::Bool(truthy));
    }
    if let Ok(value) = std::env::var(ENV_REQUEST_INTERVAL) {
        let interval: u64 = value
            .parse()
            .with_context(|| format!("{ENV_REQUEST_INTERVAL} must be a number, got {value:?}"))?;
        layer.insert("request_interval".to_string(), interval.into());
    }
    if let Ok(value) = std::env::var(ENV_ADMIN_API_PORT) {
        let port: u16 = value
            .parse()
            .with_context(|| format!("{ENV_ADMIN_API_PORT} must be a port, got {value:?}"))?;
        layer.insert("admin_api_port".to_string(), port.into());
    }
    Ok(Value::Object(layer))
}

fn cli_layer(cli: &Cli) -> anyhow::Result<Value> {
    let mut layer = Map::new();
    let mut set_string = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            layer.insert(key.to_string(), Value::String(value.clone()));
        }
    };
    set_string("folder_id", &cli.folder_id);
    set_string("agent_name", &cli.agent_name);
    set_string("environment", &cli.environment);
    set_string("transport", &cli.transport);
    set_string("log_level", &cli.log_level);

    let mut set_path = |key: &str, value: &Option<std::path::PathBuf>| {
        if let Some(value) = value {
            layer.insert(
                key.to_string(),
                Value::String(value.display().to_string()),
            );
        }
    };
    set_path("work_dir", &cli.work_dir);
    set_path("lock_dir", &cli.lock_dir);
    set_path("log_path", &cli.log_path);

    if cli.no_cache {
        layer.insert("no_cache".to_string(), Value::Bool(true));
    }
    if !cli.labels.is_empty() {
        let mut labels = Map::new();
        for raw in &cli.labels {
            let Some((key, value)) = raw.split_once('=') else {
                bail!("label {raw:?} is not in key=value form");
            };
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
        layer.insert("labels".to_string(), Value::Object(labels));
    }
    if let Command::Run { test_id } = cli.command() {
        layer.insert("test_id".to_string(), Value::String(test_id));
    }
    Ok(Value::Object(layer))
}

/// Recursively overlay `overlay` onto `base`; objects merge, everything else
/// replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, value) => *base_slot = value,
    }
}

#[cfg(test)]
#[path = "config_builder_tests.rs"]
mod tests;
