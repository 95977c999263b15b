// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Active-error set and stage stack describing what the agent is doing.
//!
//! Errors are keyed by `(stage, message)`: reporting the same message for the
//! same stage refreshes its timestamp instead of duplicating it. Insertion
//! order is preserved so the summary message reads in the order problems
//! appeared.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One active problem, keyed by `(stage, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateError {
    pub updated_at: DateTime<Utc>,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct Inner {
    errors: Vec<StateError>,
    stack: Vec<String>,
}

/// Shared service state: active errors plus the stack of entered stages.
#[derive(Debug, Default)]
pub struct State {
    inner: Mutex<Inner>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no errors are active.
    pub fn ok(&self) -> bool {
        self.inner.lock().errors.is_empty()
    }

    /// Snapshot of the active errors, in insertion order.
    pub fn current_errors(&self) -> Vec<StateError> {
        self.inner.lock().errors.clone()
    }

    /// All active error messages joined with newlines, in insertion order.
    pub fn summary_message(&self) -> String {
        let inner = self.inner.lock();
        inner
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Record an error for `stage`. Re-reporting an identical message only
    /// refreshes its timestamp.
    pub fn error(&self, stage: &str, message: impl std::fmt::Display) {
        let message = message.to_string();
        tracing::error!(stage, "{message}");
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .errors
            .iter_mut()
            .find(|e| e.stage == stage && e.message == message)
        {
            existing.updated_at = Utc::now();
            return;
        }
        inner.errors.push(StateError {
            updated_at: Utc::now(),
            stage: stage.to_string(),
            message,
        });
    }

    /// Drop every active error recorded for `stage`.
    pub fn cleanup(&self, stage: &str) {
        self.inner.lock().errors.retain(|e| e.stage != stage);
    }

    /// Push `name` onto the stage stack; popped when the guard drops.
    pub fn enter(&self, name: &str) -> StageGuard<'_> {
        self.inner.lock().stack.push(name.to_string());
        StageGuard { state: self }
    }

    /// Snapshot of the stage stack, outermost first.
    pub fn current_stack(&self) -> Vec<String> {
        self.inner.lock().stack.clone()
    }

    /// True while at least one stage is entered.
    pub fn is_alive(&self) -> bool {
        !self.inner.lock().stack.is_empty()
    }
}

/// Pops the matching stage stack entry on drop.
#[must_use]
pub struct StageGuard<'a> {
    state: &'a State,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.state.inner.lock().stack.pop();
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
