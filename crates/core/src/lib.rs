// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core building blocks for the barrage load-testing agent.
//!
//! This crate holds the data model (jobs, statuses, agent identity), the
//! process-wide cancellation signal, the error/state observer primitives,
//! the generic batched reporter, and small shared utilities. It contains no
//! transport or generator code; those live in `barrage-adapters` and
//! `barrage-engine`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent;
pub mod cancellation;
pub mod collections;
pub mod config;
pub mod error;
pub mod fs;
pub mod healthcheck;
pub mod job;
pub mod job_status;
pub mod labels;
pub mod observer;
pub mod reporter;
pub mod state;
pub mod units;
pub mod worker;

pub use agent::{AgentInfo, AgentOrigin};
pub use cancellation::{Cancellation, CancellationLevel, CancellationRequest};
pub use collections::BoundedQueue;
pub use config::AgentConfig;
pub use error::{
    AgentOriginError, ArtifactUploadError, BackendError, BackendErrorKind, CompositeError,
    GeneratorError, InvalidJobDataError, ObjectStorageError, ServiceError, TankError,
};
pub use fs::{ensure_dir, Fs, FsUsage};
pub use healthcheck::HealthCheck;
pub use job::{Ammo, ArtifactSettings, GeneratorKind, Job, JobPluginKind, JobResult};
pub use job_status::{JobStatus, TankStatus, AUTOSTOP_EXIT_CODES, INTERNAL_ERROR_TYPE};
pub use labels::LabelContext;
pub use observer::{ObservedError, ObserveSpec, Observer};
pub use reporter::{chop, ReportHandler, ReportSource, Reporter, ReporterGuard, ReporterOptions};
pub use state::{State, StateError};
pub use worker::BackgroundWorker;
