// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire and domain types shared by the broker components.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// A named unit of work advertised by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Opaque to the broker; never validated.
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl AgentCapability {
    /// Capability with just a name; the remaining fields take their defaults.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            description: String::new(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// An agent held by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredAgent {
    pub agent_id: String,
    /// Base URL without a trailing slash.
    pub endpoint: String,
    pub capabilities: Vec<AgentCapability>,
    pub registered_at: DateTime<Utc>,
}

impl RegisteredAgent {
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            agent_id: self.agent_id.clone(),
            endpoint: self.endpoint.clone(),
            capabilities: self.capabilities.iter().map(|c| c.name.clone()).collect(),
            registered_at: self.registered_at,
        }
    }
}

/// Discovery result: what a caller needs to address an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

/// One call routed through the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
    pub capability: String,
    #[serde(default)]
    pub payload: Value,
    /// Overrides the configured default timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl AgentRequest {
    pub fn new(agent_id: impl Into<String>, capability: impl Into<String>, payload: Value) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability: capability.into(),
            payload,
            timeout_secs: None,
            trace_id: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Caller-supplied timeout. Non-positive, non-finite and out-of-range
    /// values are ignored.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Outcome of a dispatched request.
///
/// Only constructed through [`AgentResponse::ok`] and [`AgentResponse::failed`],
/// so exactly one of `data` / `error` is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl AgentResponse {
    pub fn ok(data: Value, elapsed: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            duration_ms: elapsed.as_millis() as u64,
            trace_id: None,
        }
    }

    pub fn failed(err: &DispatchError, elapsed: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_owned()),
            duration_ms: elapsed.as_millis() as u64,
            trace_id: None,
        }
    }

    pub(crate) fn traced(mut self, trace_id: &str) -> Self {
        self.trace_id = Some(trace_id.to_owned());
        self
    }
}

/// Broker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl BrokerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for BrokerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
