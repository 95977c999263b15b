// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped error classification: the agent's central control-flow primitive.
//!
//! Every fallible stage of the agent runs inside [`Observer::observe`] (or
//! its async twin). The observer clears old errors for the stage, refuses to
//! start under forced cancellation, tracks the stage on the state stack, and
//! classifies failures against the caller's [`ObserveSpec`]:
//!
//! - cancellation requests always propagate,
//! - `error`-matched failures are stored into [`State`](crate::state::State),
//! - `critical`-matched failures trigger a graceful cancellation,
//! - `suppress`-matched failures are swallowed (`Ok(None)`), everything else
//!   re-raises.

use std::future::Future;
use std::sync::Arc;

use crate::cancellation::{Cancellation, CancellationLevel, CancellationRequest};
use crate::state::State;

/// Errors the observer can classify.
pub trait ObservedError: From<CancellationRequest> + std::fmt::Display {
    /// Returns the inner cancellation request when this error is one.
    fn as_cancellation(&self) -> Option<&CancellationRequest>;
}

type Matcher<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Which failures to suppress, record, or escalate within a scope.
///
/// Every matcher defaults to "matches nothing".
pub struct ObserveSpec<E> {
    suppress: Option<Matcher<E>>,
    error: Option<Matcher<E>>,
    critical: Option<Matcher<E>>,
}

impl<E> Default for ObserveSpec<E> {
    fn default() -> Self {
        Self {
            suppress: None,
            error: None,
            critical: None,
        }
    }
}

impl<E> ObserveSpec<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swallow matching failures instead of re-raising them.
    pub fn suppress(mut self, matcher: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.suppress = Some(Box::new(matcher));
        self
    }

    /// Store matching failures into the service state.
    pub fn error(mut self, matcher: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(matcher));
        self
    }

    /// Trigger a graceful cancellation on matching failures.
    pub fn critical(mut self, matcher: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.critical = Some(Box::new(matcher));
        self
    }

    fn matches_suppress(&self, e: &E) -> bool {
        self.suppress.as_ref().is_some_and(|m| m(e))
    }

    fn matches_error(&self, e: &E) -> bool {
        self.error.as_ref().is_some_and(|m| m(e))
    }

    fn matches_critical(&self, e: &E) -> bool {
        self.critical.as_ref().is_some_and(|m| m(e))
    }
}

/// Applies [`ObserveSpec`] classification around fallible scopes.
#[derive(Clone)]
pub struct Observer {
    state: Arc<State>,
    cancellation: Arc<Cancellation>,
}

impl Observer {
    pub fn new(state: Arc<State>, cancellation: Arc<Cancellation>) -> Self {
        Self {
            state,
            cancellation,
        }
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn cancellation(&self) -> &Arc<Cancellation> {
        &self.cancellation
    }

    /// Run `f` as stage `stage`, classifying its failure per `spec`.
    ///
    /// `Ok(None)` means the failure was suppressed.
    pub fn observe<T, E>(
        &self,
        stage: &str,
        spec: &ObserveSpec<E>,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<T>, E>
    where
        E: ObservedError,
    {
        match self.begin(stage) {
            Ok(()) => {}
            Err(request) => return Err(E::from(request)),
        }
        let result = {
            let _stage = self.state.enter(stage);
            f()
        };
        self.settle(stage, spec, result)
    }

    /// Async variant of [`Observer::observe`] with identical semantics.
    pub async fn observe_async<T, E, F>(
        &self,
        stage: &str,
        spec: &ObserveSpec<E>,
        f: F,
    ) -> Result<Option<T>, E>
    where
        E: ObservedError,
        F: Future<Output = Result<T, E>>,
    {
        match self.begin(stage) {
            Ok(()) => {}
            Err(request) => return Err(E::from(request)),
        }
        let result = {
            let _stage = self.state.enter(stage);
            f.await
        };
        self.settle(stage, spec, result)
    }

    fn begin(&self, stage: &str) -> Result<(), CancellationRequest> {
        self.state.cleanup(stage);
        if let Err(request) = self.cancellation.raise_on_set(CancellationLevel::Forced) {
            tracing::warn!(stage, "terminating stage due to cancellation request");
            return Err(request);
        }
        Ok(())
    }

    fn settle<T, E>(
        &self,
        stage: &str,
        spec: &ObserveSpec<E>,
        result: Result<T, E>,
    ) -> Result<Option<T>, E>
    where
        E: ObservedError,
    {
        let e = match result {
            Ok(value) => {
                self.state.cleanup(stage);
                return Ok(Some(value));
            }
            Err(e) => e,
        };

        if e.as_cancellation().is_some() {
            tracing::warn!(stage, "terminating stage due to cancellation request");
            return Err(e);
        }

        let msg = format!("error at \"{stage}\": {e}");
        let is_critical = spec.matches_critical(&e);
        let is_suppressed = spec.matches_suppress(&e);

        if spec.matches_error(&e) {
            self.state.error(stage, &msg);
        }

        if is_critical {
            self.cancellation
                .notify(&msg, CancellationLevel::Graceful);
            tracing::error!("critical error: {msg}; notifying service termination");
        }

        if is_suppressed {
            tracing::info!(stage, "noncritical error: {e}");
            return Ok(None);
        }

        tracing::error!("{msg}");
        Err(e)
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
