// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic healthcheck runner.

use std::sync::Arc;
use std::time::Duration;

use barrage_core::healthcheck::HealthCheck;
use barrage_core::observer::{ObserveSpec, Observer};
use barrage_core::worker::BackgroundWorker;

pub const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Runs every registered check on an interval, each under its own observer
/// scope so one broken check cannot starve the others.
pub struct HealthCheckService {
    observer: Observer,
    checks: Vec<Box<dyn HealthCheck>>,
    interval: Duration,
}

impl HealthCheckService {
    pub fn new(observer: Observer, checks: Vec<Box<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            observer,
            checks,
            interval,
        }
    }

    /// One pass over every check.
    pub fn healthcheck(&self) {
        for check in &self.checks {
            let result = self
                .observer
                .observe("healthcheck", &ObserveSpec::default(), || {
                    check.healthcheck()
                });
            if let Err(e) = result {
                tracing::error!("healthcheck failed: {e}");
            }
        }
    }

    /// Run one synchronous pass, then start the background loop.
    pub fn run(self: Arc<Self>) -> BackgroundWorker {
        self.healthcheck();
        let service = self.clone();
        BackgroundWorker::spawn(self.interval, move || {
            let service = service.clone();
            async move {
                service.healthcheck();
            }
        })
    }
}

#[cfg(test)]
#[path = "healthcheck_tests.rs"]
mod tests;
