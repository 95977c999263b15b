// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level checks against the built `barrage` binary.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::Command;

fn barrage() -> Command {
    let mut cmd = Command::cargo_bin("barrage").unwrap();
    for (name, _) in std::env::vars() {
        if name.starts_with("LOADTESTING_") {
            cmd.env_remove(name);
        }
    }
    cmd
}

#[test]
fn version_prints_the_crate_version() {
    barrage()
        .arg("version")
        .assert()
        .success()
        .stdout(format!("{}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_transport_fails_fast() {
    barrage()
        .args(["--transport", "carrier-pigeon", "serve"])
        .assert()
        .failure();
}

#[test]
fn serve_without_backend_url_fails_fast() {
    // the default http transport refuses to start without a backend url
    barrage().arg("serve").assert().failure();
}

#[test]
fn malformed_labels_are_rejected() {
    barrage()
        .args(["--label", "no-equals-sign", "serve"])
        .assert()
        .failure();
}
