// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and generator status types.

use serde::{Deserialize, Serialize};

/// Error type used for failures originating inside the generator.
pub const INTERNAL_ERROR_TYPE: &str = "internal";

/// Return codes the generator's autostop criteria exit with.
pub const AUTOSTOP_EXIT_CODES: &[i32] = &[21, 22, 23, 24, 25, 26, 27, 28, 30, 31, 32, 33];

/// Conventional statuses a job settles into.
pub mod status {
    pub const UNSPECIFIED: &str = "JOB_STATUS_UNSPECIFIED";
    pub const FINISHED: &str = "FINISHED";
    pub const STOPPED: &str = "STOPPED";
    pub const FAILED: &str = "FAILED";
    pub const AUTOSTOPPED: &str = "AUTOSTOPPED";
}

fn conventional_exit_code(status: &str) -> Option<i32> {
    match status {
        status::FINISHED | status::STOPPED => Some(0),
        status::FAILED => Some(1),
        status::AUTOSTOPPED => Some(20),
        _ => None,
    }
}

/// Status of one job as reported to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: String,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub exit_code: Option<i32>,
}

impl JobStatus {
    /// Plain status with the conventional exit code when terminal.
    pub fn from_status(status: &str) -> Self {
        Self::with_details(status, None, None, None)
    }

    /// Status carrying error details; an explicit exit code wins over the
    /// conventional one.
    pub fn with_details(
        status: &str,
        error: Option<String>,
        error_type: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        let exit_code = exit_code.or_else(|| conventional_exit_code(status));
        Self {
            status: status.to_string(),
            error,
            error_type,
            exit_code,
        }
    }

    pub fn finished(&self) -> bool {
        matches!(
            self.status.as_str(),
            status::FINISHED | status::STOPPED | status::FAILED | status::AUTOSTOPPED
        )
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::from_status(status::UNSPECIFIED)
    }
}

/// Externally visible generator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TankStatus {
    StatusUnspecified,
    ReadyForTest,
    PreparingTest,
    Testing,
    TankFailed,
    Stopped,
    UploadingArtifacts,
    Error,
}

impl TankStatus {
    /// Wire name of the status.
    pub fn name(self) -> &'static str {
        match self {
            TankStatus::StatusUnspecified => "STATUS_UNSPECIFIED",
            TankStatus::ReadyForTest => "READY_FOR_TEST",
            TankStatus::PreparingTest => "PREPARING_TEST",
            TankStatus::Testing => "TESTING",
            TankStatus::TankFailed => "TANK_FAILED",
            TankStatus::Stopped => "STOPPED",
            TankStatus::UploadingArtifacts => "UPLOADING_ARTIFACTS",
            TankStatus::Error => "ERROR",
        }
    }

    /// The agent is not busy with a test.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            TankStatus::StatusUnspecified | TankStatus::ReadyForTest | TankStatus::Stopped
        )
    }
}

impl std::fmt::Display for TankStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[path = "job_status_tests.rs"]
mod tests;
