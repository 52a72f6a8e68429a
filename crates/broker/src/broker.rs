// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker orchestrator: lifecycle state machine and per-request pipeline.
//!
//! Every request runs policy → rate limit → registry lookup → dispatch →
//! audit, and always comes back as an [`AgentResponse`]. Failures are values,
//! never errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::audit::AuditLogger;
use crate::auth::AuthManager;
use crate::config::BrokerConfig;
use crate::error::DispatchError;
use crate::policy::PolicyEngine;
use crate::rate_limit::RateLimiter;
use crate::registry::AgentRegistry;
use crate::types::{AgentCapability, AgentRequest, AgentResponse, BrokerState};
use crate::upstream::client::AgentClient;

/// How long shutdown waits for cancelled requests to finish auditing.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Independently constructed components the broker composes.
pub struct Components {
    pub registry: Arc<AgentRegistry>,
    pub policy: Arc<PolicyEngine>,
    pub limiter: Arc<RateLimiter>,
    pub auth: Arc<AuthManager>,
    pub audit: Arc<AuditLogger>,
}

impl Components {
    /// Build every component from config, loading the policy file and TLS
    /// material. Any failure here must keep the broker from running.
    pub fn from_config(config: &BrokerConfig) -> anyhow::Result<Self> {
        let policy = match config.policy {
            Some(ref path) => PolicyEngine::from_file(path)?,
            None => PolicyEngine::permissive(),
        };

        let auth = AuthManager::new();
        if config.mtls_enabled {
            match (&config.tls_cert, &config.tls_key, &config.tls_ca) {
                (Some(cert), Some(key), Some(ca)) => auth.setup_mutual_tls(cert, key, ca)?,
                _ => anyhow::bail!("mutual TLS enabled without certificate, key and CA paths"),
            }
        }

        Ok(Self {
            registry: Arc::new(AgentRegistry::new()),
            policy: Arc::new(policy),
            limiter: Arc::new(RateLimiter::new()),
            auth: Arc::new(auth),
            audit: Arc::new(AuditLogger::new(config.audit_path())),
        })
    }
}

/// Agent registration as accepted by [`Broker::register_agent`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Registration {
    pub agent_id: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    /// Shared secret the agent must present to manage itself later.
    #[serde(default)]
    pub secret: Option<String>,
}

/// The broker. Cheap to share behind an `Arc`.
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<AgentRegistry>,
    policy: Arc<PolicyEngine>,
    limiter: Arc<RateLimiter>,
    auth: Arc<AuthManager>,
    audit: Arc<AuditLogger>,
    client: AgentClient,
    state: Mutex<BrokerState>,
    inflight: TaskTracker,
    cancel: Mutex<CancellationToken>,
}

impl Broker {
    pub fn new(config: BrokerConfig, components: Components) -> anyhow::Result<Arc<Self>> {
        let tls = components.auth.tls_material();
        let client = AgentClient::new(&config, tls.as_deref())?;
        Ok(Arc::new(Self {
            config,
            registry: components.registry,
            policy: components.policy,
            limiter: components.limiter,
            auth: components.auth,
            audit: components.audit,
            client,
            state: Mutex::new(BrokerState::Stopped),
            inflight: TaskTracker::new(),
            cancel: Mutex::new(CancellationToken::new()),
        }))
    }

    pub fn from_config(config: BrokerConfig) -> anyhow::Result<Arc<Self>> {
        let components = Components::from_config(&config)?;
        Self::new(config, components)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    // -- Lifecycle ------------------------------------------------------------

    pub fn state(&self) -> BrokerState {
        *self.state.lock()
    }

    pub fn health_check(&self) -> bool {
        self.state() == BrokerState::Running
    }

    /// Move from `from` to `to`, or report the state actually found.
    fn transition(&self, from: &[BrokerState], to: BrokerState) -> Result<(), BrokerState> {
        let mut state = self.state.lock();
        if !from.contains(&state) {
            return Err(*state);
        }
        tracing::info!(from = %*state, to = %to, "broker state transition");
        *state = to;
        Ok(())
    }

    fn fail(&self, reason: &str) {
        tracing::error!(reason, "broker entered error state");
        *self.state.lock() = BrokerState::Error;
    }

    /// STOPPED → STARTING → RUNNING.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.transition(&[BrokerState::Stopped], BrokerState::Starting)
            .map_err(|found| anyhow::anyhow!("cannot start broker in state {found}"))?;

        if self.config.mtls_enabled && !self.auth.is_mutual_tls_enabled() {
            self.fail("mutual TLS requested but not set up");
            anyhow::bail!("mutual TLS requested but not set up");
        }

        *self.cancel.lock() = CancellationToken::new();
        self.inflight.reopen();

        self.transition(&[BrokerState::Starting], BrokerState::Running)
            .map_err(|found| anyhow::anyhow!("broker left STARTING unexpectedly ({found})"))?;
        Ok(())
    }

    /// RUNNING → STOPPING → STOPPED, draining in-flight requests first.
    ///
    /// Requests still running after the drain timeout are cancelled; they
    /// resolve as transport errors and are audited like any other outcome.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.transition(&[BrokerState::Running, BrokerState::Starting], BrokerState::Stopping)
            .map_err(|found| anyhow::anyhow!("cannot shut down broker in state {found}"))?;

        self.inflight.close();
        let drain = self.config.drain_timeout();
        if tokio::time::timeout(drain, self.inflight.wait()).await.is_err() {
            tracing::warn!(
                inflight = self.inflight.len(),
                "drain timeout after {drain:?}, cancelling in-flight requests"
            );
            self.cancel.lock().cancel();
            if tokio::time::timeout(CANCEL_GRACE, self.inflight.wait()).await.is_err() {
                tracing::warn!(inflight = self.inflight.len(), "requests still running at shutdown");
            }
        }

        if let Err(e) = self.audit.flush().await {
            tracing::warn!(err = %e, "audit flush failed during shutdown");
        }

        self.transition(&[BrokerState::Stopping], BrokerState::Stopped)
            .map_err(|found| anyhow::anyhow!("broker left STOPPING unexpectedly ({found})"))?;
        Ok(())
    }

    // -- Agent management -----------------------------------------------------

    /// Register an agent and seed its rate limit and shared secret.
    ///
    /// The limit is the lowest policy override among the agent's capabilities,
    /// else the policy default, else the configured default; 0 means unbounded.
    pub fn register_agent(&self, registration: Registration) -> String {
        let limit = self
            .policy
            .rate_limit_for(&registration.capabilities)
            .unwrap_or(self.config.default_rate_limit_per_minute);

        let id = self.registry.register(
            registration.agent_id,
            &registration.endpoint,
            registration.capabilities,
        );
        if limit > 0 {
            self.limiter.set_limit(&id, limit);
        } else {
            self.limiter.clear_limit(&id);
        }
        if let Some(ref secret) = registration.secret {
            self.auth.register_agent(&id, secret);
        }
        id
    }

    /// Remove an agent and its secret. Returns whether it existed.
    ///
    /// Its quota is dropped too, unless the current window is still open.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.registry.unregister(agent_id).is_some();
        self.limiter.retire(agent_id);
        self.auth.remove_agent(agent_id);
        removed
    }

    // -- Request pipeline -----------------------------------------------------

    /// Run one request through the pipeline. Never fails; failures are
    /// reported in the response.
    pub async fn handle_request(&self, request: AgentRequest) -> AgentResponse {
        let _inflight = self.inflight.token();
        let started = Instant::now();
        let trace_id = request.trace_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let response = match self.process(&request, &trace_id).await {
            Ok(data) => {
                let response = AgentResponse::ok(data, started.elapsed());
                tracing::debug!(
                    agent_id = %request.agent_id,
                    capability = %request.capability,
                    trace_id = %trace_id,
                    duration_ms = response.duration_ms,
                    "request succeeded"
                );
                response
            }
            Err(err) => {
                let response = AgentResponse::failed(&err, started.elapsed());
                tracing::warn!(
                    agent_id = %request.agent_id,
                    capability = %request.capability,
                    trace_id = %trace_id,
                    duration_ms = response.duration_ms,
                    code = err.code(),
                    err = %err,
                    "request failed"
                );
                response
            }
        }
        .traced(&trace_id);

        if self.config.audit_enabled {
            self.audit.log_request(&request, &response).await;
        }
        response
    }

    async fn process(&self, request: &AgentRequest, trace_id: &str) -> Result<Value, DispatchError> {
        let state = self.state();
        if state != BrokerState::Running {
            return Err(DispatchError::BrokerUnavailable { state: state.to_string() });
        }

        if !self.policy.validate_request(request) {
            return Err(DispatchError::PolicyViolation);
        }

        // Check and record as one step so slow or failing calls still count.
        if !self.limiter.try_acquire(&request.agent_id) {
            return Err(DispatchError::RateLimitExceeded);
        }

        let agent = self.registry.get(&request.agent_id).ok_or_else(|| {
            DispatchError::AgentNotRegistered { agent_id: request.agent_id.clone() }
        })?;

        let timeout = request.timeout().unwrap_or_else(|| self.config.default_timeout());
        let cancel = self.cancel.lock().clone();
        tokio::select! {
            result = self.client.invoke(
                &agent.endpoint,
                &request.capability,
                &request.payload,
                timeout,
                trace_id,
            ) => result,
            _ = cancel.cancelled() => Err(DispatchError::TransportError {
                detail: "request cancelled by shutdown".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
