// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeClientFactory;

fn config(transport: &str) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.transport = transport.to_string();
    config.backend_service_url = "http://127.0.0.1:1".to_string();
    config
}

#[test]
fn unknown_transport_lists_registered_names() {
    let registry = TransportRegistry::new();
    let err = registry.create(&config("grpc")).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("grpc"));
    assert!(text.contains("http"));
}

#[test]
fn builtin_http_transport_resolves() {
    let registry = TransportRegistry::new();
    assert!(registry.create(&config("http")).is_ok());
}

#[test]
fn custom_transport_can_be_registered() {
    let mut registry = TransportRegistry::new();
    registry.register("fake", |_config| {
        Ok(Arc::new(FakeClientFactory::default()) as Arc<dyn ClientFactory>)
    });
    assert!(registry.create(&config("fake")).is_ok());
}

#[test]
fn failing_constructor_reports_init_error() {
    let mut registry = TransportRegistry::new();
    registry.register("broken", |_config| Err("missing credentials".to_string()));
    let err = registry.create(&config("broken")).unwrap_err();
    assert!(matches!(err, RegistryError::InitFailed { .. }));
    assert!(err.to_string().contains("missing credentials"));
}
