// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the broker.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::broker::Broker;

/// Build the axum `Router` with all broker routes.
pub fn build_router(broker: Arc<Broker>) -> Router {
    let max_connections = broker.config().max_connections;
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Agent management
        .route("/api/v1/agents", post(http::register_agent))
        .route("/api/v1/agents/discover", get(http::discover))
        .route("/api/v1/agents/{id}", delete(http::unregister_agent))
        // Dispatch
        .route("/api/v1/requests", post(http::handle_request))
        // Audit + policy
        .route("/api/v1/audit", get(http::audit))
        .route("/api/v1/policy/reload", post(http::reload_policy))
        // Middleware
        .layer(middleware::from_fn_with_state(broker.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(GlobalConcurrencyLimitLayer::new(max_connections))
        .with_state(broker)
}
