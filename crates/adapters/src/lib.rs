// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client contracts and transports for the barrage agent.
//!
//! The daemon and engine only ever talk to the traits in [`clients`] and
//! [`generator`]; this crate also ships the default JSON-over-HTTP transport
//! and, behind the `test-support` feature, scripted fakes for every trait.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clients;
pub mod generator;
pub mod http;
pub mod process;
pub mod registry;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use clients::{
    AgentClient, ArtifactUploadSettings, BackendClient, ClientFactory, JobMessage, JobSignal,
    LogClient, LogMessage, NamedService, Severity, StorageClient, StorageObject, TelemetryClient,
    TestDataEntry,
};
pub use generator::{
    GeneratorAdapter, GeneratorPipes, GeneratorSpec, GeneratorWorker, ImbalanceEntry,
    MonitoringChunk, TrailItem, WorkerState,
};
pub use registry::TransportRegistry;
pub use retry::{retry_call, RequestMeta, RetryPolicy};
