// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! After-job artifact publishers.

mod logs;
mod object_store;

pub use logs::{LogKind, LogUploaderService};
pub use object_store::{collect_artifacts, ObjectStoreUploader, ROOT_SEGMENT};

use async_trait::async_trait;

use barrage_core::error::ServiceError;
use barrage_core::job::Job;

/// One post-job publisher; failures are isolated by the control loop.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn publish_artifacts(&self, job: &Job) -> Result<(), ServiceError>;
}
