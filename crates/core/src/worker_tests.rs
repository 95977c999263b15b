// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn runs_first_iteration_immediately() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let worker = BackgroundWorker::spawn(Duration::from_secs(3600), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.stop().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_interrupts_the_wait() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let worker = BackgroundWorker::spawn(Duration::from_secs(3600), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = std::time::Instant::now();
    worker.stop().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn repeats_on_interval() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let worker = BackgroundWorker::spawn(Duration::from_millis(10), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.stop().await;
    assert!(count.load(Ordering::SeqCst) >= 2);
}
