// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bad_request  = { 400, BackendErrorKind::InvalidArgument },
    unauthd      = { 401, BackendErrorKind::Unauthenticated },
    forbidden    = { 403, BackendErrorKind::PermissionDenied },
    not_found    = { 404, BackendErrorKind::NotFound },
    conflict     = { 409, BackendErrorKind::Aborted },
    precondition = { 412, BackendErrorKind::FailedPrecondition },
    throttled    = { 429, BackendErrorKind::TooManyRequests },
    internal     = { 500, BackendErrorKind::Internal },
    bad_gateway  = { 502, BackendErrorKind::GatewayTimeout },
    unavailable  = { 503, BackendErrorKind::Unavailable },
    timeout      = { 504, BackendErrorKind::GatewayTimeout },
    teapot       = { 418, BackendErrorKind::Unknown },
)]
fn status_mapping(code: u16, expected: BackendErrorKind) {
    let status = reqwest::StatusCode::from_u16(code).unwrap();
    assert_eq!(kind_for_status(status), expected);
}

#[test]
fn factory_requires_backend_url() {
    let config = AgentConfig::default();
    assert!(HttpClientFactory::new(&config).is_err());

    let mut config = AgentConfig::default();
    config.backend_service_url = "http://127.0.0.1:1".to_string();
    assert!(HttpClientFactory::new(&config).is_ok());
}

#[test]
fn agent_id_extraction() {
    let ok = serde_json::json!({ "agent_instance_id": "agt42" });
    assert_eq!(agent_id_from(&ok).unwrap(), "agt42");
    let missing = serde_json::json!({ "something": "else" });
    assert!(agent_id_from(&missing).is_err());
}

#[tokio::test]
async fn unreachable_backend_maps_to_unavailable() {
    let mut config = AgentConfig::default();
    // reserved port with nothing listening
    config.backend_service_url = "http://127.0.0.1:1".to_string();
    let factory = HttpClientFactory::new(&config).unwrap();
    let agent = barrage_core::agent::AgentInfo {
        id: Some("agt".to_string()),
        name: None,
        version: None,
        origin: barrage_core::agent::AgentOrigin::External,
        folder_id: None,
    };
    let client = factory.create_backend_client(&agent);
    let err = client.get_job(None).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::Unavailable);
}
