// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn starts_unset() {
    let c = Cancellation::new();
    assert_eq!(c.level(), CancellationLevel::NotSet);
    assert!(!c.is_set(CancellationLevel::Graceful));
    assert!(!c.is_set(CancellationLevel::Forced));
    assert!(c.raise_on_set(CancellationLevel::Graceful).is_ok());
}

#[test]
fn graceful_sets_graceful_only() {
    let c = Cancellation::new();
    c.notify("stopping", CancellationLevel::Graceful);
    assert!(c.is_set(CancellationLevel::Graceful));
    assert!(!c.is_set(CancellationLevel::Forced));
    assert_eq!(c.explain(), "stopping");
}

#[test]
fn level_never_decreases() {
    let c = Cancellation::new();
    c.notify("first", CancellationLevel::Forced);
    c.notify("second", CancellationLevel::Graceful);
    assert_eq!(c.level(), CancellationLevel::Forced);
    // the reason still tracks the latest notify
    assert_eq!(c.explain(), "second");
    c.notify("third", CancellationLevel::NotSet);
    assert_eq!(c.level(), CancellationLevel::Forced);
}

#[test]
fn forced_raise_is_permanent() {
    let c = Cancellation::new();
    c.notify("shutdown now", CancellationLevel::Forced);
    for _ in 0..3 {
        let err = c.raise_on_set(CancellationLevel::Forced).unwrap_err();
        assert!(err.to_string().contains("shutdown now"));
    }
}

#[yare::parameterized(
    not_set   = { CancellationLevel::NotSet,   "not_set" },
    graceful  = { CancellationLevel::Graceful, "graceful" },
    forced    = { CancellationLevel::Forced,   "forced" },
)]
fn level_display(level: CancellationLevel, expected: &str) {
    assert_eq!(level.to_string(), expected);
}

#[test]
fn notify_is_usable_from_threads() {
    let c = std::sync::Arc::new(Cancellation::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let c = c.clone();
            std::thread::spawn(move || {
                let level = if i % 2 == 0 {
                    CancellationLevel::Graceful
                } else {
                    CancellationLevel::Forced
                };
                c.notify("threaded", level);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(c.level(), CancellationLevel::Forced);
}
