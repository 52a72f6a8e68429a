// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allow/deny policy over capabilities and agent identities.
//!
//! A non-empty allow-list flips its dimension to default-deny. Deny-lists are
//! always consulted first.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{AgentCapability, AgentRequest};

/// Policy document as loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub whitelist: RuleSet,
    #[serde(default)]
    pub blacklist: RuleSet,
    #[serde(default)]
    pub rate_limits: RateLimitPolicy,
}

impl PolicyDocument {
    /// Parse a policy file: YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read policy {}: {e}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let doc = if is_yaml {
            serde_yaml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("malformed policy {}: {e}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("malformed policy {}: {e}", path.display()))?
        };
        Ok(doc)
    }
}

/// One allow or deny list pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Exact capability names.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Exact agent ids or `prefix*` patterns.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// `rate_limits` section: a default plus per-capability overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u32>,
    #[serde(flatten)]
    pub capabilities: BTreeMap<String, u32>,
}

/// Agent id matcher: exact, or prefix when the pattern ends in `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPattern {
    Exact(String),
    Prefix(String),
}

impl AgentPattern {
    pub fn parse(pattern: &str) -> anyhow::Result<Self> {
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => {
                anyhow::bail!("invalid agent pattern {pattern:?}: only a trailing '*' is supported")
            }
            Some(prefix) => Ok(Self::Prefix(prefix.to_owned())),
            None if pattern.contains('*') => {
                anyhow::bail!("invalid agent pattern {pattern:?}: only a trailing '*' is supported")
            }
            None => Ok(Self::Exact(pattern.to_owned())),
        }
    }

    pub fn matches(&self, agent_id: &str) -> bool {
        match self {
            Self::Exact(id) => id == agent_id,
            Self::Prefix(prefix) => agent_id.starts_with(prefix.as_str()),
        }
    }
}

/// Compiled, read-mostly form of a [`PolicyDocument`].
#[derive(Debug, Default)]
struct Policy {
    allowed_capabilities: HashSet<String>,
    denied_capabilities: HashSet<String>,
    allowed_agents: Vec<AgentPattern>,
    denied_agents: Vec<AgentPattern>,
    rate_limits: RateLimitPolicy,
}

impl Policy {
    fn compile(doc: PolicyDocument) -> anyhow::Result<Self> {
        let patterns = |list: &[String]| -> anyhow::Result<Vec<AgentPattern>> {
            list.iter().map(|p| AgentPattern::parse(p)).collect()
        };
        Ok(Self {
            allowed_agents: patterns(&doc.whitelist.agents)?,
            denied_agents: patterns(&doc.blacklist.agents)?,
            allowed_capabilities: doc.whitelist.capabilities.into_iter().collect(),
            denied_capabilities: doc.blacklist.capabilities.into_iter().collect(),
            rate_limits: doc.rate_limits,
        })
    }
}

/// Evaluates whether an (agent, capability) pair may be invoked.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    policy: RwLock<Policy>,
    source: RwLock<Option<PathBuf>>,
}

impl PolicyEngine {
    /// An engine with empty lists: everything allowed.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn from_document(doc: PolicyDocument) -> anyhow::Result<Self> {
        let engine = Self::default();
        engine.load_policy(doc)?;
        Ok(engine)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let engine = Self::default();
        engine.load_file(path)?;
        Ok(engine)
    }

    /// Replace the active policy. On error the previous policy stays in force.
    pub fn load_policy(&self, doc: PolicyDocument) -> anyhow::Result<()> {
        let compiled = Policy::compile(doc)?;
        tracing::info!(
            allow_capabilities = compiled.allowed_capabilities.len(),
            deny_capabilities = compiled.denied_capabilities.len(),
            allow_agents = compiled.allowed_agents.len(),
            deny_agents = compiled.denied_agents.len(),
            "policy loaded"
        );
        *self.policy.write() = compiled;
        Ok(())
    }

    pub fn load_file(&self, path: &Path) -> anyhow::Result<()> {
        let doc = PolicyDocument::from_file(path)?;
        self.load_policy(doc)?;
        *self.source.write() = Some(path.to_path_buf());
        Ok(())
    }

    /// Re-read the file the policy was last loaded from.
    pub fn reload(&self) -> anyhow::Result<PathBuf> {
        let path = self
            .source
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no policy file configured"))?;
        self.load_file(&path)?;
        Ok(path)
    }

    pub fn is_capability_allowed(&self, name: &str) -> bool {
        let policy = self.policy.read();
        if policy.denied_capabilities.contains(name) {
            return false;
        }
        policy.allowed_capabilities.is_empty() || policy.allowed_capabilities.contains(name)
    }

    pub fn is_agent_allowed(&self, agent_id: &str) -> bool {
        let policy = self.policy.read();
        if policy.denied_agents.iter().any(|p| p.matches(agent_id)) {
            return false;
        }
        policy.allowed_agents.is_empty() || policy.allowed_agents.iter().any(|p| p.matches(agent_id))
    }

    /// Both checks; denials are logged here so callers only map the outcome.
    pub fn validate_request(&self, request: &AgentRequest) -> bool {
        if !self.is_agent_allowed(&request.agent_id) {
            tracing::warn!(agent_id = %request.agent_id, "agent blocked by policy");
            return false;
        }
        if !self.is_capability_allowed(&request.capability) {
            tracing::warn!(
                agent_id = %request.agent_id,
                capability = %request.capability,
                "capability blocked by policy"
            );
            return false;
        }
        true
    }

    /// Rate limit the policy assigns to an agent advertising `capabilities`:
    /// the lowest matching per-capability override, else the policy default.
    pub fn rate_limit_for(&self, capabilities: &[AgentCapability]) -> Option<u32> {
        let policy = self.policy.read();
        capabilities
            .iter()
            .filter_map(|c| policy.rate_limits.capabilities.get(&c.name).copied())
            .min()
            .or(policy.rate_limits.default)
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
