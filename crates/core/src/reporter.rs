// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic batched background uploader with retry, retention and backoff.
//!
//! A [`Reporter`] drains its source queues, timestamps every item, and hands
//! timestamp-ordered chunks to each handler. Failed chunks are requeued into
//! the handler's bounded unsent deque (oldest evicted first) and retried on
//! the next pass, until they age past the retention period. Handlers may
//! additionally be gated by an exponential backoff that opens again after
//! `base * multiplier^n` (capped) since their last failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collections::BoundedQueue;
use crate::error::{CompositeError, ServiceError};

/// Anything the reporter can drain without blocking.
pub trait ReportSource<T>: Send + Sync {
    fn try_pop(&self) -> Option<T>;
}

impl<T: Send> ReportSource<T> for BoundedQueue<T> {
    fn try_pop(&self) -> Option<T> {
        BoundedQueue::try_pop(self)
    }
}

/// Consumes batches drained by a [`Reporter`].
#[async_trait]
pub trait ReportHandler<T>: Send + Sync {
    async fn handle(&self, request_id: &str, batch: Vec<T>) -> Result<(), ServiceError>;

    /// Called once per pass with the collected failure (or a
    /// [`CompositeError`] when several chunks failed).
    fn on_error(&self, error: &ServiceError);

    /// Chunk size for [`chop`]; `0` sends everything as one chunk.
    fn max_batch_size(&self) -> usize {
        0
    }
}

/// A drained item waiting to be delivered.
#[derive(Debug, Clone)]
pub struct Unsent<T> {
    pub ts: DateTime<Utc>,
    pub data: T,
}

/// Slice `items` into chunks of at most `size`; `size == 0` keeps one chunk.
///
/// Concatenating the result always reproduces the input.
pub fn chop<T>(mut items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![items];
    }
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    while items.len() > size {
        let rest = items.split_off(size);
        chunks.push(items);
        items = rest;
    }
    chunks.push(items);
    chunks
}

#[derive(Debug)]
struct AttemptTracker {
    enabled: bool,
    next_attempt: Option<Instant>,
    current_delay: Duration,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl AttemptTracker {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next_attempt: None,
            current_delay: Duration::from_secs(2),
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            max_delay: Duration::from_secs(600),
        }
    }

    fn can_attempt(&self, now: Instant) -> bool {
        !self.enabled || self.next_attempt.is_none_or(|at| now >= at)
    }

    fn record(&mut self, now: Instant, failure: bool) {
        if !self.enabled {
            return;
        }
        if !failure {
            self.next_attempt = None;
            self.current_delay = self.base_delay;
            return;
        }
        let delay = self.current_delay.min(self.max_delay);
        self.next_attempt = Some(now + delay);
        self.current_delay = (self.current_delay * self.multiplier).min(self.max_delay);
    }
}

struct HandlerSlot<T> {
    handler: Box<dyn ReportHandler<T>>,
    unsent: Mutex<VecDeque<Unsent<T>>>,
    attempts: Mutex<AttemptTracker>,
}

/// Tuning knobs for a [`Reporter`].
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    pub retention_period: Duration,
    pub report_interval: Duration,
    pub max_unsent_size: usize,
    pub exponential_backoff: bool,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            retention_period: Duration::from_secs(3600),
            report_interval: Duration::from_secs(5),
            max_unsent_size: 1000,
            exponential_backoff: false,
        }
    }
}

/// Batched background uploader; see the module docs.
pub struct Reporter<T> {
    sources: Mutex<Vec<Arc<dyn ReportSource<T>>>>,
    slots: Vec<HandlerSlot<T>>,
    options: ReporterOptions,
}

impl<T> Reporter<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(handlers: Vec<Box<dyn ReportHandler<T>>>, options: ReporterOptions) -> Self {
        let slots = handlers
            .into_iter()
            .map(|handler| HandlerSlot {
                handler,
                unsent: Mutex::new(VecDeque::new()),
                attempts: Mutex::new(AttemptTracker::new(options.exponential_backoff)),
            })
            .collect();
        Self {
            sources: Mutex::new(Vec::new()),
            slots,
            options,
        }
    }

    pub fn add_source(&self, source: Arc<dyn ReportSource<T>>) {
        self.sources.lock().push(source);
    }

    /// One delivery pass. `force` ignores handler backoff; used for the
    /// final drain on shutdown.
    pub async fn report(&self, force: bool) {
        let now = Utc::now();
        let new_records = self.collect_new(now);

        for slot in &self.slots {
            if !force && !slot.attempts.lock().can_attempt(Instant::now()) {
                self.put_unsent(slot, new_records.clone());
                continue;
            }

            let mut pending = self.take_unsent(slot);
            pending.extend(new_records.iter().cloned());
            let cutoff = now
                - chrono::Duration::from_std(self.options.retention_period)
                    .unwrap_or(chrono::Duration::zero());
            pending.retain(|record| record.ts >= cutoff);
            pending.sort_by_key(|record| record.ts);

            let chunks = chop(pending, slot.handler.max_batch_size());
            let total = chunks.len();
            let mut errors = Vec::new();
            for chunk in chunks {
                let request_id = Uuid::new_v4().to_string();
                let batch: Vec<T> = chunk.iter().map(|record| record.data.clone()).collect();
                if let Err(error) = slot.handler.handle(&request_id, batch).await {
                    self.put_unsent(slot, chunk);
                    errors.push(error);
                }
            }

            if total > 0 {
                let all_failed = errors.len() == total;
                slot.attempts.lock().record(Instant::now(), all_failed);
            }
            match errors.len() {
                0 => {}
                1 => {
                    if let Some(error) = errors.pop() {
                        slot.handler.on_error(&error);
                    }
                }
                _ => slot
                    .handler
                    .on_error(&ServiceError::Composite(CompositeError { errors })),
            }
        }
    }

    fn collect_new(&self, now: DateTime<Utc>) -> Vec<Unsent<T>> {
        let sources = self.sources.lock();
        let mut records = Vec::new();
        for source in sources.iter() {
            while let Some(data) = source.try_pop() {
                records.push(Unsent { ts: now, data });
            }
        }
        records
    }

    fn take_unsent(&self, slot: &HandlerSlot<T>) -> Vec<Unsent<T>> {
        slot.unsent.lock().drain(..).collect()
    }

    fn put_unsent(&self, slot: &HandlerSlot<T>, records: Vec<Unsent<T>>) {
        let mut unsent = slot.unsent.lock();
        for record in records {
            unsent.push_back(record);
        }
        while unsent.len() > self.options.max_unsent_size {
            unsent.pop_front();
        }
    }

    /// Spawn the interval worker; the returned guard drains once more with
    /// `force` on [`ReporterGuard::stop`].
    pub fn run(self: &Arc<Self>) -> ReporterGuard<T> {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let reporter = Arc::clone(self);
        let interval = self.options.report_interval;
        let handle = tokio::spawn(async move {
            loop {
                reporter.report(false).await;
                tokio::select! {
                    _ = worker_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        ReporterGuard {
            reporter: Arc::clone(self),
            token,
            handle,
        }
    }
}

/// Running reporter worker; stop to signal, join and flush.
pub struct ReporterGuard<T> {
    reporter: Arc<Reporter<T>>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl<T> ReporterGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
        self.reporter.report(true).await;
    }
}

#[cfg(test)]
#[path = "reporter_tests.rs"]
mod tests;
