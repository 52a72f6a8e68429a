// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability-indexed agent registry.
//!
//! Agents are indexed under each capability name and under `tag:<tag>` for
//! every tag their capabilities carry. Registration is rare relative to
//! lookup, so everything sits behind one `RwLock`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::types::{AgentCapability, AgentSummary, RegisteredAgent};

const TAG_PREFIX: &str = "tag:";

#[derive(Default)]
struct Inner {
    agents: HashMap<String, Arc<RegisteredAgent>>,
    /// Capability name or `tag:<tag>` → agent ids.
    index: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn index_keys(agent: &RegisteredAgent) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for cap in &agent.capabilities {
            keys.insert(cap.name.clone());
            for tag in &cap.tags {
                keys.insert(format!("{TAG_PREFIX}{tag}"));
            }
        }
        keys
    }

    fn remove(&mut self, agent_id: &str) -> Option<Arc<RegisteredAgent>> {
        let agent = self.agents.remove(agent_id)?;
        for key in Self::index_keys(&agent) {
            if let Some(ids) = self.index.get_mut(&key) {
                ids.remove(agent_id);
                if ids.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
        Some(agent)
    }
}

/// Maps agent identity to endpoint and advertised capabilities.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<Inner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent. Returns the agent id.
    pub fn register(
        &self,
        agent_id: impl Into<String>,
        endpoint: impl AsRef<str>,
        capabilities: Vec<AgentCapability>,
    ) -> String {
        let agent = RegisteredAgent {
            agent_id: agent_id.into(),
            endpoint: endpoint.as_ref().trim_end_matches('/').to_owned(),
            capabilities,
            registered_at: Utc::now(),
        };
        let id = agent.agent_id.clone();
        let keys = Inner::index_keys(&agent);

        let mut inner = self.inner.write();
        let replaced = inner.remove(&id).is_some();
        for key in keys {
            inner.index.entry(key).or_default().insert(id.clone());
        }
        inner.agents.insert(id.clone(), Arc::new(agent));
        drop(inner);

        if replaced {
            tracing::debug!(agent_id = %id, "agent re-registered");
        } else {
            tracing::info!(agent_id = %id, "agent registered");
        }
        id
    }

    /// Remove an agent and every index entry that pointed at it.
    pub fn unregister(&self, agent_id: &str) -> Option<Arc<RegisteredAgent>> {
        let removed = self.inner.write().remove(agent_id);
        if removed.is_some() {
            tracing::info!(agent_id, "agent unregistered");
        }
        removed
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.read().agents.contains_key(agent_id)
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<RegisteredAgent>> {
        self.inner.read().agents.get(agent_id).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.inner.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of agents matching any of `tags` and agents offering `capability`.
    ///
    /// With neither filter the result is empty; there is no list-all.
    /// Results are ordered by agent id.
    pub fn discover(&self, tags: &[String], capability: Option<&str>) -> Vec<AgentSummary> {
        let inner = self.inner.read();
        let mut ids: BTreeSet<&str> = BTreeSet::new();

        for tag in tags {
            if let Some(found) = inner.index.get(&format!("{TAG_PREFIX}{tag}")) {
                ids.extend(found.iter().map(String::as_str));
            }
        }
        if let Some(name) = capability {
            if let Some(found) = inner.index.get(name) {
                ids.extend(found.iter().map(String::as_str));
            }
        }

        ids.into_iter().filter_map(|id| inner.agents.get(id)).map(|a| a.summary()).collect()
    }

    /// Number of distinct index keys; exposed for leak checks.
    pub fn index_len(&self) -> usize {
        self.inner.read().index.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
