// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport selection: a name-keyed registry of client factories.
//!
//! There is no runtime code loading; transports register a constructor at
//! startup and configuration picks one by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use barrage_core::config::AgentConfig;

use crate::clients::ClientFactory;
use crate::http::HttpClientFactory;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown transport {name:?}; registered transports: {known}")]
    UnknownTransport { name: String, known: String },
    #[error("transport {name:?} failed to initialize: {message}")]
    InitFailed { name: String, message: String },
}

type FactoryCtor =
    Box<dyn Fn(&AgentConfig) -> Result<Arc<dyn ClientFactory>, String> + Send + Sync>;

/// Name → factory constructor map.
pub struct TransportRegistry {
    factories: BTreeMap<String, FactoryCtor>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportRegistry {
    /// Registry with the built-in `http` transport.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register("http", |config| {
            HttpClientFactory::new(config).map(|f| Arc::new(f) as Arc<dyn ClientFactory>)
        });
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        ctor: impl Fn(&AgentConfig) -> Result<Arc<dyn ClientFactory>, String> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.to_string(), Box::new(ctor));
    }

    /// Instantiate the transport selected by `config.transport`.
    pub fn create(&self, config: &AgentConfig) -> Result<Arc<dyn ClientFactory>, RegistryError> {
        let name = config.transport.as_str();
        let Some(ctor) = self.factories.get(name) else {
            return Err(RegistryError::UnknownTransport {
                name: name.to_string(),
                known: self
                    .factories
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };
        ctor(config).map_err(|message| RegistryError::InitFailed {
            name: name.to_string(),
            message,
        })
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
