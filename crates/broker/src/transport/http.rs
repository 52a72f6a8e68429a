// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the broker API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::{Broker, Registration};
use crate::error::{ApiError, DispatchError};
use crate::transport::auth::validate_agent_secret;
use crate::types::AgentRequest;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_count: usize,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub agent_id: String,
    pub registered: bool,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub agent_id: String,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    /// Comma-separated tag list.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub capability: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub source: String,
    pub reloaded: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(b): State<Arc<Broker>>) -> impl IntoResponse {
    let status = if b.health_check() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body =
        HealthResponse { status: b.state().as_str().to_owned(), agent_count: b.registry().len() };
    (status, Json(body))
}

/// `POST /api/v1/agents`: register or re-register an agent.
pub async fn register_agent(
    State(b): State<Arc<Broker>>,
    headers: HeaderMap,
    Json(req): Json<Registration>,
) -> impl IntoResponse {
    if req.agent_id.trim().is_empty() {
        return ApiError::BadRequest.to_http_response("agent_id is required").into_response();
    }
    if req.endpoint.trim().is_empty() {
        return ApiError::BadRequest.to_http_response("endpoint is required").into_response();
    }
    if let Err(code) = validate_agent_secret(&b, &headers, &req.agent_id) {
        return code.to_http_response("agent secret mismatch").into_response();
    }

    let agent_id = b.register_agent(req);
    Json(RegisterResponse { agent_id, registered: true }).into_response()
}

/// `DELETE /api/v1/agents/{id}`: unregister an agent.
pub async fn unregister_agent(
    State(b): State<Arc<Broker>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !b.registry().is_registered(&id) {
        let err = DispatchError::AgentNotRegistered { agent_id: id };
        return ApiError::from(&err).to_http_response(err.to_string()).into_response();
    }
    if let Err(code) = validate_agent_secret(&b, &headers, &id) {
        return code.to_http_response("agent secret mismatch").into_response();
    }

    let removed = b.unregister_agent(&id);
    Json(UnregisterResponse { agent_id: id, removed }).into_response()
}

/// `GET /api/v1/agents/discover?tags=a,b&capability=x`
pub async fn discover(
    State(b): State<Arc<Broker>>,
    Query(q): Query<DiscoverQuery>,
) -> impl IntoResponse {
    let tags: Vec<String> = q
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    let capability = q.capability.as_deref().filter(|c| !c.is_empty());
    Json(b.registry().discover(&tags, capability))
}

/// `POST /api/v1/requests`: route one request. Failures are in the body.
pub async fn handle_request(
    State(b): State<Arc<Broker>>,
    Json(req): Json<AgentRequest>,
) -> impl IntoResponse {
    Json(b.handle_request(req).await)
}

/// `GET /api/v1/audit?since=...&agent_id=...`
pub async fn audit(State(b): State<Arc<Broker>>, Query(q): Query<AuditQuery>) -> impl IntoResponse {
    Json(b.audit().query(q.since, q.agent_id.as_deref()))
}

/// `POST /api/v1/policy/reload`
pub async fn reload_policy(State(b): State<Arc<Broker>>) -> impl IntoResponse {
    match b.policy().reload() {
        Ok(path) => {
            tracing::info!(source = %path.display(), "policy reloaded");
            Json(ReloadResponse { source: path.display().to_string(), reloaded: true })
                .into_response()
        }
        Err(e) => {
            tracing::warn!(err = %e, "policy reload failed, keeping previous policy");
            ApiError::BadRequest.to_http_response(format!("{e:#}")).into_response()
        }
    }
}
