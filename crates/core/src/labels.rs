// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped labels attached to emitted log records.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::agent::AgentInfo;

/// Labels attached to every log record captured while a scope is active.
///
/// Scopes nest: entering a scope layers its labels over the current set and
/// restores the previous set when the guard drops.
#[derive(Debug, Default)]
pub struct LabelContext {
    labels: Mutex<BTreeMap<String, String>>,
}

impl LabelContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the currently active labels.
    pub fn current(&self) -> BTreeMap<String, String> {
        self.labels.lock().clone()
    }

    /// Layer `labels` over the active set until the guard drops.
    pub fn scope(self: &Arc<Self>, labels: BTreeMap<String, String>) -> LabelScope {
        let previous = {
            let mut current = self.labels.lock();
            let previous = current.clone();
            current.extend(labels);
            previous
        };
        LabelScope {
            context: Arc::clone(self),
            previous,
        }
    }

    /// Scope carrying the agent's identity labels.
    pub fn agent_scope(self: &Arc<Self>, agent: &AgentInfo) -> LabelScope {
        let mut labels = BTreeMap::new();
        labels.insert("agent_id".to_string(), agent.id_str().to_string());
        labels.insert(
            "agent_name".to_string(),
            agent.name.clone().unwrap_or_default(),
        );
        labels.insert(
            "agent_version".to_string(),
            agent.version.clone().unwrap_or_default(),
        );
        self.scope(labels)
    }
}

/// Restores the previous label set on drop.
#[must_use]
pub struct LabelScope {
    context: Arc<LabelContext>,
    previous: BTreeMap<String, String>,
}

impl Drop for LabelScope {
    fn drop(&mut self) {
        *self.context.labels.lock() = std::mem::take(&mut self.previous);
    }
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod tests;
