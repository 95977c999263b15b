// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    finished    = { status::FINISHED,    Some(0) },
    stopped     = { status::STOPPED,     Some(0) },
    failed      = { status::FAILED,      Some(1) },
    autostopped = { status::AUTOSTOPPED, Some(20) },
    testing     = { "TESTING",           None },
    unspecified = { status::UNSPECIFIED, None },
)]
fn conventional_exit_codes(status: &str, expected: Option<i32>) {
    assert_eq!(JobStatus::from_status(status).exit_code, expected);
}

#[test]
fn explicit_exit_code_wins() {
    let s = JobStatus::with_details(status::AUTOSTOPPED, None, None, Some(28));
    assert_eq!(s.exit_code, Some(28));
}

#[yare::parameterized(
    finished    = { status::FINISHED,    true },
    stopped     = { status::STOPPED,     true },
    failed      = { status::FAILED,      true },
    autostopped = { status::AUTOSTOPPED, true },
    testing     = { "TESTING",           false },
    unspecified = { status::UNSPECIFIED, false },
)]
fn finished_statuses(status: &str, expected: bool) {
    assert_eq!(JobStatus::from_status(status).finished(), expected);
}

#[test]
fn default_status_is_unspecified() {
    let s = JobStatus::default();
    assert_eq!(s.status, status::UNSPECIFIED);
    assert!(!s.finished());
    assert!(s.error.is_none());
}

#[yare::parameterized(
    unspecified = { TankStatus::StatusUnspecified,  true },
    ready       = { TankStatus::ReadyForTest,       true },
    stopped     = { TankStatus::Stopped,            true },
    preparing   = { TankStatus::PreparingTest,      false },
    testing     = { TankStatus::Testing,            false },
    failed      = { TankStatus::TankFailed,         false },
    uploading   = { TankStatus::UploadingArtifacts, false },
    error       = { TankStatus::Error,              false },
)]
fn idle_statuses(status: TankStatus, expected: bool) {
    assert_eq!(status.is_idle(), expected);
}

#[test]
fn tank_status_names_match_wire_form() {
    assert_eq!(TankStatus::ReadyForTest.name(), "READY_FOR_TEST");
    assert_eq!(TankStatus::UploadingArtifacts.to_string(), "UPLOADING_ARTIFACTS");
}

#[test]
fn autostop_codes_are_a_fixed_set() {
    assert!(AUTOSTOP_EXIT_CODES.contains(&21));
    assert!(AUTOSTOP_EXIT_CODES.contains(&28));
    assert!(!AUTOSTOP_EXIT_CODES.contains(&0));
    assert!(!AUTOSTOP_EXIT_CODES.contains(&1));
    assert!(!AUTOSTOP_EXIT_CODES.contains(&29));
}
