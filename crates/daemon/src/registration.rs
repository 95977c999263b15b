// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity and control-plane registration.

use std::path::Path;
use std::sync::Arc;

use barrage_core::agent::{AgentInfo, AgentOrigin};
use barrage_core::config::AgentConfig;
use barrage_core::error::{AgentOriginError, ServiceError};

use barrage_adapters::clients::AgentClient;

/// The agent-id file never legitimately exceeds this.
const AGENT_ID_MAX_LEN: usize = 50;

/// Derive the agent's identity from configuration; the id stays unset until
/// [`register`] runs.
pub fn make_agent_info(config: &AgentConfig) -> AgentInfo {
    let origin = if config.instance_lt_created && config.compute_instance_id.is_some() {
        AgentOrigin::ProviderCreated
    } else {
        AgentOrigin::External
    };
    AgentInfo {
        id: None,
        name: config.agent_name.clone().filter(|name| !name.is_empty()),
        version: config
            .agent_version
            .clone()
            .or_else(|| Some(env!("CARGO_PKG_VERSION").to_string())),
        origin,
        folder_id: config.folder_id.clone().filter(|id| !id.is_empty()),
    }
}

/// Register this agent with the control plane, reusing a cached id for
/// persistent external agents when allowed.
pub async fn register(
    config: &AgentConfig,
    client: Arc<dyn AgentClient>,
) -> Result<AgentInfo, ServiceError> {
    let mut agent = make_agent_info(config);
    let use_cache = !config.no_cache;

    match agent.origin {
        AgentOrigin::ProviderCreated => {
            let id = client.register_agent().await?;
            tracing::info!("the agent has been registered with id {id}");
            agent.id = Some(id);
        }
        AgentOrigin::External | AgentOrigin::Unknown => {
            if agent.is_persistent_external() {
                if use_cache {
                    if let Some(file) = &config.agent_id_file {
                        if let Some(cached) = load_agent_id(file) {
                            tracing::info!("loaded agent id from file ({cached})");
                            agent.id = Some(cached);
                            return Ok(agent);
                        }
                    }
                }
                let folder_id = agent.folder_id.clone().unwrap_or_default();
                let name = agent.name.clone().unwrap_or_default();
                let id = client.register_external_agent(&folder_id, &name).await?;
                tracing::info!("the agent has been registered with id {id}");
                if use_cache {
                    if let Some(file) = &config.agent_id_file {
                        store_agent_id(file, &id);
                    }
                }
                agent.id = Some(id);
            } else if agent.is_anonymous_external() {
                agent.id = None;
            } else {
                return Err(AgentOriginError(
                    "unable to identify agent id: external agents need both a folder id and \
                     an agent name"
                        .to_string(),
                )
                .into());
            }
        }
    }
    Ok(agent)
}

fn load_agent_id(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let id: String = content.trim().chars().take(AGENT_ID_MAX_LEN).collect();
            (!id.is_empty()).then_some(id)
        }
        Err(e) => {
            tracing::debug!("no cached agent id at {}: {e}", path.display());
            None
        }
    }
}

fn store_agent_id(path: &Path, id: &str) {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, id)
    };
    if let Err(e) = write() {
        tracing::error!("failed to save agent id to {}: {e}", path.display());
    }
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
