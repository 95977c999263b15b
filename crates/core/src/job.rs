// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One test execution and its configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job_status::JobStatus;

/// Well-known generator plugin families referenced by job configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPluginKind {
    Telegraf,
    Autostop,
    Uploader,
    Phantom,
    Pandora,
    Jmeter,
    ResourceCheck,
}

impl JobPluginKind {
    /// The `package` value a config entry uses to select this plugin.
    pub fn package(self) -> &'static str {
        match self {
            JobPluginKind::Telegraf => "generator.plugins.Telegraf",
            JobPluginKind::Autostop => "generator.plugins.Autostop",
            JobPluginKind::Uploader => "generator.plugins.DataUploader",
            JobPluginKind::Phantom => "generator.plugins.Phantom",
            JobPluginKind::Pandora => "generator.plugins.Pandora",
            JobPluginKind::Jmeter => "generator.plugins.JMeter",
            JobPluginKind::ResourceCheck => "generator.plugins.ResourceCheck",
        }
    }
}

/// Load engine driving a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Unknown,
    Phantom,
    Pandora,
    Jmeter,
}

impl GeneratorKind {
    /// Lowercase name used in log resource types and log file prefixes.
    pub fn log_name(self) -> &'static str {
        match self {
            GeneratorKind::Unknown => "unknown",
            GeneratorKind::Phantom => "phantom",
            GeneratorKind::Pandora => "pandora",
            GeneratorKind::Jmeter => "jmeter",
        }
    }
}

/// Test-data payload downloaded before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ammo {
    pub name: String,
    pub path: PathBuf,
}

/// Where and how to publish artifacts after a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    pub output_bucket: String,
    pub output_name: String,
    pub is_archive: bool,
    pub filter_include: Vec<String>,
    pub filter_exclude: Vec<String>,
}

/// Final outcome of a single-job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub status: String,
    pub exit_code: i32,
}

/// One test execution.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// The generator's internal id, set after prepare.
    pub tank_job_id: Option<String>,
    /// Job config parsed from the control plane's JSON.
    pub config: Value,
    pub ammos: Vec<Ammo>,
    pub log_group_id: Option<String>,
    pub test_data_dir: Option<PathBuf>,
    pub artifact_dir_path: Option<PathBuf>,
    pub upload_artifact_settings: Option<ArtifactSettings>,
    pub last_status: JobStatus,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tank_job_id: None,
            config: Value::Null,
            ammos: Vec::new(),
            log_group_id: None,
            test_data_dir: None,
            artifact_dir_path: None,
            upload_artifact_settings: None,
            last_status: JobStatus::default(),
        }
    }

    /// Which load engine the config selects.
    pub fn generator(&self) -> GeneratorKind {
        if self.plugin_enabled(JobPluginKind::Pandora) {
            GeneratorKind::Pandora
        } else if self.plugin_enabled(JobPluginKind::Phantom) {
            GeneratorKind::Phantom
        } else if self.plugin_enabled(JobPluginKind::Jmeter) {
            GeneratorKind::Jmeter
        } else {
            GeneratorKind::Unknown
        }
    }

    pub fn plugin_enabled(&self, kind: JobPluginKind) -> bool {
        !self.plugins(kind).is_empty()
    }

    /// Enabled config sections whose `package` selects `kind`, as
    /// `(section name, section)` pairs.
    pub fn plugins(&self, kind: JobPluginKind) -> Vec<(String, Value)> {
        let Some(object) = self.config.as_object() else {
            return Vec::new();
        };
        object
            .iter()
            .filter(|(_, section)| {
                section.get("package").and_then(Value::as_str) == Some(kind.package())
                    && is_truthy(section.get("enabled"))
            })
            .map(|(name, section)| (name.clone(), section.clone()))
            .collect()
    }

    pub fn update_status(&mut self, status: JobStatus) {
        self.last_status = status;
    }

    pub fn finished(&self) -> bool {
        self.last_status.finished()
    }

    pub fn result(&self) -> JobResult {
        JobResult {
            status: self.last_status.status.clone(),
            exit_code: self.last_status.exit_code.unwrap_or(0),
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        _ => false,
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
