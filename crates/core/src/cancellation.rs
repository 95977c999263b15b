// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-level process-wide stop signal.
//!
//! A single [`Cancellation`] value is shared (behind an `Arc`) by every
//! long-running worker in the agent. The level only ever widens: once
//! `Forced` is reached it stays there until the process exits.

use parking_lot::Mutex;
use thiserror::Error;

/// Error raised when an operation observes an active cancellation request.
///
/// Always propagated by observers and never retried; carries the reason the
/// cancellation was requested with.
#[derive(Debug, Clone, Error)]
#[error("cancellation requested: {0}")]
pub struct CancellationRequest(pub String);

/// How hard the agent has been asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancellationLevel {
    /// No cancellation requested.
    NotSet,
    /// Finish the current job, skip new work, drain and exit.
    Graceful,
    /// Abort observer scopes as soon as possible.
    Forced,
}

impl std::fmt::Display for CancellationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CancellationLevel::NotSet => "not_set",
            CancellationLevel::Graceful => "graceful",
            CancellationLevel::Forced => "forced",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Inner {
    level: CancellationLevel,
    reason: String,
}

/// Monotonic two-level stop signal usable from any task.
#[derive(Debug)]
pub struct Cancellation {
    inner: Mutex<Inner>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                level: CancellationLevel::NotSet,
                reason: String::new(),
            }),
        }
    }

    /// Widen the current level to `max(current, level)` and remember the
    /// latest reason.
    pub fn notify(&self, reason: &str, level: CancellationLevel) {
        let mut inner = self.inner.lock();
        if level > inner.level {
            inner.level = level;
        }
        inner.reason = reason.to_string();
    }

    /// True when cancellation has been requested at `level` or above.
    pub fn is_set(&self, level: CancellationLevel) -> bool {
        self.inner.lock().level >= level
    }

    /// Current level.
    pub fn level(&self) -> CancellationLevel {
        self.inner.lock().level
    }

    /// Error out when cancellation has been requested at `level` or above.
    pub fn raise_on_set(&self, level: CancellationLevel) -> Result<(), CancellationRequest> {
        if self.is_set(level) {
            return Err(CancellationRequest(self.explain()));
        }
        Ok(())
    }

    /// The reason supplied with the most recent `notify`.
    pub fn explain(&self) -> String {
        self.inner.lock().reason.clone()
    }
}

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;
