// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved agent configuration.
//!
//! Built by the cli crate's layered config builder; everything downstream
//! only ever sees this struct.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid label key {0:?}")]
    InvalidLabelKey(String),
    #[error("invalid label value {0:?} for key {1:?}")]
    InvalidLabelValue(String, String),
}

/// Resolved configuration for one agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Runtime environment feature switch (`DEFAULT` or a provider name).
    pub environment: String,
    /// Transport factory name resolved through the registry.
    pub transport: String,

    /// Skip the cached agent-id file on registration.
    pub no_cache: bool,

    pub backend_service_url: String,
    pub iam_service_url: String,
    pub logging_service_url: String,
    pub object_storage_url: String,

    pub agent_id_file: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub lock_dir: PathBuf,

    /// Control-loop polling period, seconds (floor 1).
    pub request_interval: u64,
    /// Status report period, seconds; defaults to `request_interval`.
    pub reporter_interval: Option<u64>,
    /// Filesystem healthcheck period, seconds.
    pub healthcheck_interval: u64,

    pub log_path: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Cloud log group receiving agent logs.
    pub log_group_id: Option<String>,
    /// Batch size for the backend log channel.
    pub log_max_chunk_size: usize,
    /// Retention for undelivered log batches, e.g. `"3h"`.
    pub log_retention_period: Option<String>,

    pub agent_name: Option<String>,
    pub folder_id: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub agent_version: Option<String>,

    /// Bearer token for the default HTTP transport.
    pub auth_token: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,

    /// Run exactly this test and exit.
    pub test_id: Option<String>,

    pub compute_instance_id: Option<String>,
    /// Set when the compute provider created this instance for load testing.
    pub instance_lt_created: bool,

    /// Local admin API port; disabled when unset.
    pub admin_api_port: Option<u16>,

    /// Generator launch command for the process-backed adapter.
    pub generator_cmd: Option<String>,
    /// Download cache of the generator's resource manager.
    pub resource_cache_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            environment: "DEFAULT".to_string(),
            transport: "http".to_string(),
            no_cache: false,
            backend_service_url: String::new(),
            iam_service_url: String::new(),
            logging_service_url: String::new(),
            object_storage_url: String::new(),
            agent_id_file: None,
            work_dir: std::env::temp_dir().join("barrage"),
            lock_dir: PathBuf::from("/var/lock"),
            request_interval: 1,
            reporter_interval: None,
            healthcheck_interval: 30,
            log_path: None,
            log_level: None,
            log_group_id: None,
            log_max_chunk_size: 1000,
            log_retention_period: None,
            agent_name: None,
            folder_id: None,
            labels: BTreeMap::new(),
            agent_version: None,
            auth_token: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            test_id: None,
            compute_instance_id: None,
            instance_lt_created: false,
            admin_api_port: None,
            generator_cmd: None,
            resource_cache_dir: None,
        }
    }
}

impl AgentConfig {
    /// Validate user-supplied labels against the backend's label charset.
    pub fn validate_labels(&self) -> Result<(), ConfigError> {
        for (key, value) in &self.labels {
            if !valid_label_key(key) {
                return Err(ConfigError::InvalidLabelKey(key.clone()));
            }
            if !valid_label_value(value) {
                return Err(ConfigError::InvalidLabelValue(value.clone(), key.clone()));
            }
        }
        Ok(())
    }
}

fn valid_label_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '/' | '@')
}

fn valid_label_key(key: &str) -> bool {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    key.len() <= 63 && first.is_ascii_lowercase() && chars.all(valid_label_char)
}

fn valid_label_value(value: &str) -> bool {
    value.len() <= 63 && value.chars().all(valid_label_char)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
