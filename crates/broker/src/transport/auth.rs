// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::constant_time_eq;
use crate::broker::Broker;
use crate::error::ApiError;

/// Header an agent presents to manage its own registration.
pub const AGENT_SECRET_HEADER: &str = "x-agent-secret";

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Check `X-Agent-Secret` against the secret `agent_id` registered with.
///
/// Agents that never registered a secret pass unconditionally.
pub fn validate_agent_secret(
    broker: &Broker,
    headers: &HeaderMap,
    agent_id: &str,
) -> Result<(), ApiError> {
    if !broker.auth().has_secret(agent_id) {
        return Ok(());
    }
    let supplied = headers
        .get(AGENT_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if broker.auth().authenticate(agent_id, supplied) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/v1/health`.
pub async fn auth_layer(
    state: State<Arc<Broker>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/v1/health" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config().auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
