// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Per-request failure kinds.
///
/// These never cross `handle_request` as errors; they are rendered into a
/// failed [`AgentResponse`](crate::types::AgentResponse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    PolicyViolation,
    RateLimitExceeded,
    AgentNotRegistered { agent_id: String },
    UpstreamTimeout { after: Duration },
    UpstreamError { status: u16, detail: String },
    TransportError { detail: String },
    BrokerUnavailable { state: String },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::AgentNotRegistered { .. } => "AGENT_NOT_REGISTERED",
            Self::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            Self::UpstreamError { .. } => "UPSTREAM_ERROR",
            Self::TransportError { .. } => "TRANSPORT_ERROR",
            Self::BrokerUnavailable { .. } => "BROKER_UNAVAILABLE",
        }
    }

    /// Only connection-level failures are worth another attempt: the agent
    /// never saw the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyViolation => f.write_str("blocked by policy"),
            Self::RateLimitExceeded => f.write_str("rate limit exceeded"),
            Self::AgentNotRegistered { agent_id } => write!(f, "agent {agent_id} not registered"),
            Self::UpstreamTimeout { after } => {
                write!(f, "request timed out after {:.3}s", after.as_secs_f64())
            }
            Self::UpstreamError { status, detail } if detail.is_empty() => {
                write!(f, "agent returned HTTP {status}")
            }
            Self::UpstreamError { status, detail } => {
                write!(f, "agent returned HTTP {status}: {detail}")
            }
            Self::TransportError { detail } => write!(f, "connection failed: {detail}"),
            Self::BrokerUnavailable { state } => write!(f, "broker not running (state: {state})"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Error codes for the broker's HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    AgentNotFound,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::AgentNotFound => 404,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl From<&DispatchError> for ApiError {
    /// HTTP code for a pipeline failure surfaced by a management route.
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::AgentNotRegistered { .. } => Self::AgentNotFound,
            _ => Self::BadRequest,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
