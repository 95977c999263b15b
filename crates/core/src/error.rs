// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the agent.
//!
//! Transport implementations map their failures into [`BackendError`] kinds;
//! everything above the transport layer classifies errors through
//! [`ServiceError`], which is what the observer primitive works on.

use thiserror::Error;

use crate::cancellation::CancellationRequest;
use crate::observer::ObservedError;

/// Canonical failure kinds of the control plane, mirroring its RPC codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    Unknown,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    Unauthorized,
    FailedPrecondition,
    Aborted,
    TooManyRequests,
    Internal,
    Unavailable,
    GatewayTimeout,
}

impl BackendErrorKind {
    /// Transient backend trouble: tolerated (suppressed) for the duration of
    /// a job by the job loop.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            BackendErrorKind::Internal
                | BackendErrorKind::Unavailable
                | BackendErrorKind::GatewayTimeout
                | BackendErrorKind::TooManyRequests
        )
    }

    /// The backend no longer recognizes this agent or operation.
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            BackendErrorKind::FailedPrecondition
                | BackendErrorKind::NotFound
                | BackendErrorKind::Unauthorized
                | BackendErrorKind::Unauthenticated
        )
    }

    /// Kinds retried at the RPC layer.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            BackendErrorKind::Unknown
                | BackendErrorKind::PermissionDenied
                | BackendErrorKind::Unavailable
                | BackendErrorKind::Unauthenticated
                | BackendErrorKind::Aborted
        )
    }
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendErrorKind::Unknown => "UNKNOWN",
            BackendErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            BackendErrorKind::NotFound => "NOT_FOUND",
            BackendErrorKind::PermissionDenied => "PERMISSION_DENIED",
            BackendErrorKind::Unauthenticated => "UNAUTHENTICATED",
            BackendErrorKind::Unauthorized => "UNAUTHORIZED",
            BackendErrorKind::FailedPrecondition => "FAILED_PRECONDITION",
            BackendErrorKind::Aborted => "ABORTED",
            BackendErrorKind::TooManyRequests => "TOO_MANY_REQUESTS",
            BackendErrorKind::Internal => "INTERNAL",
            BackendErrorKind::Unavailable => "UNAVAILABLE",
            BackendErrorKind::GatewayTimeout => "GATEWAY_TIMEOUT",
        };
        f.write_str(name)
    }
}

/// A failed control-plane call.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Internal, message)
    }
}

/// Generator refused or failed a lifecycle operation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TankError(pub String);

impl TankError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The generator worker itself misbehaved (spawn, validation, pipe protocol).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GeneratorError(pub String);

impl GeneratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A job payload (config or test data) failed validation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InvalidJobDataError(pub String);

/// Object storage download/upload failure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ObjectStorageError(pub String);

/// Artifact publishing failure; non-fatal to the agent.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ArtifactUploadError(pub String);

/// The agent origin/config combination does not allow registration.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AgentOriginError(pub String);

/// Several independent failures collected by one operation.
#[derive(Debug)]
pub struct CompositeError {
    pub errors: Vec<ServiceError>,
}

impl std::fmt::Display for CompositeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "multiple errors occurred:")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

/// The daemon-level error sum classified by observers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Cancelled(#[from] CancellationRequest),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Tank(#[from] TankError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error("job stopped by backend signal")]
    JobStopped,
    #[error("{0}")]
    JobNotExecuted(String),
    #[error(transparent)]
    InvalidJobData(#[from] InvalidJobDataError),
    #[error(transparent)]
    ObjectStorage(#[from] ObjectStorageError),
    #[error(transparent)]
    ArtifactUpload(#[from] ArtifactUploadError),
    #[error(transparent)]
    AgentOrigin(#[from] AgentOriginError),
    #[error("not enough free space: {0}")]
    NotEnoughFreeSpace(String),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            ServiceError::Backend(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_transient_backend(&self) -> bool {
        self.backend_kind().is_some_and(|k| k.is_transient())
    }

    pub fn is_backend_rejection(&self) -> bool {
        self.backend_kind().is_some_and(|k| k.is_rejection())
    }
}

impl ObservedError for ServiceError {
    fn as_cancellation(&self) -> Option<&CancellationRequest> {
        match self {
            ServiceError::Cancelled(req) => Some(req),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
