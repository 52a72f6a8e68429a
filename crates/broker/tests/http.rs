// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the broker HTTP API.
//!
//! Uses `axum_test::TestServer` for the inbound side and in-process mock
//! agents for the outbound side.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use a2a_broker::broker::Broker;
use a2a_broker::config::BrokerConfig;
use a2a_broker::test_support::{test_config, AnyhowExt, MockAgent};
use a2a_broker::transport::build_router;

async fn running(config: BrokerConfig) -> anyhow::Result<Arc<Broker>> {
    let broker = Broker::from_config(config)?;
    broker.start().await?;
    Ok(broker)
}

fn test_server(broker: Arc<Broker>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(broker)).anyhow()
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_reports_running_and_agent_count() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;
    server
        .post("/api/v1/agents")
        .json(&json!({"agent_id": "a", "endpoint": "http://a", "capabilities": []}))
        .await
        .assert_status_ok();

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["agent_count"], 1);
    Ok(())
}

#[tokio::test]
async fn health_is_unavailable_until_started() -> anyhow::Result<()> {
    let server = test_server(Broker::from_config(test_config(None))?)?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json();
    assert_eq!(body["status"], "stopped");
    Ok(())
}

// -- Agent management ---------------------------------------------------------

#[tokio::test]
async fn register_then_discover_by_tag_and_capability() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;
    for (id, cap, tag) in [("scanner", "scan", "security"), ("linter", "lint", "quality")] {
        let resp = server
            .post("/api/v1/agents")
            .json(&json!({
                "agent_id": id,
                "endpoint": format!("http://{id}/"),
                "capabilities": [{"name": cap, "tags": [tag]}],
            }))
            .await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["agent_id"], id);
        assert_eq!(body["registered"], true);
    }

    let by_tag: Vec<Value> = server.get("/api/v1/agents/discover?tags=security").await.json();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0]["agent_id"], "scanner");
    assert_eq!(by_tag[0]["endpoint"], "http://scanner");

    let union: Vec<Value> =
        server.get("/api/v1/agents/discover?tags=security&capability=lint").await.json();
    let ids: Vec<&str> = union.iter().filter_map(|a| a["agent_id"].as_str()).collect();
    assert_eq!(ids, vec!["linter", "scanner"]);

    let nothing: Vec<Value> = server.get("/api/v1/agents/discover").await.json();
    assert!(nothing.is_empty());
    Ok(())
}

#[tokio::test]
async fn register_rejects_missing_fields() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;

    let resp = server.post("/api/v1/agents").json(&json!({"agent_id": "", "endpoint": "x"})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn unregister_unknown_agent_is_404() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;

    let resp = server.delete("/api/v1/agents/ghost").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "AGENT_NOT_FOUND");
    assert_eq!(body["error"]["message"], "agent ghost not registered");
    Ok(())
}

#[tokio::test]
async fn agent_secret_guards_reregistration_and_removal() -> anyhow::Result<()> {
    let broker = running(test_config(None)).await?;
    let server = test_server(Arc::clone(&broker))?;
    let registration = json!({"agent_id": "locked", "endpoint": "http://locked", "secret": "s3cret"});

    server.post("/api/v1/agents").json(&registration).await.assert_status_ok();

    server
        .post("/api/v1/agents")
        .json(&json!({"agent_id": "locked", "endpoint": "http://hijack"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(
        broker.registry().get("locked").map(|a| a.endpoint.clone()).as_deref(),
        Some("http://locked")
    );

    server.delete("/api/v1/agents/locked").await.assert_status(StatusCode::UNAUTHORIZED);
    server
        .delete("/api/v1/agents/locked")
        .add_header(HeaderName::from_static("x-agent-secret"), HeaderValue::from_static("s3cret"))
        .await
        .assert_status_ok();
    assert!(!broker.registry().is_registered("locked"));
    Ok(())
}

// -- Dispatch -----------------------------------------------------------------

#[tokio::test]
async fn request_is_routed_to_agent() -> anyhow::Result<()> {
    let agent = MockAgent::ok("scan", json!({"findings": []})).await?;
    let server = test_server(running(test_config(None)).await?)?;
    server
        .post("/api/v1/agents")
        .json(&json!({"agent_id": "security-scanner", "endpoint": agent.url, "capabilities": [{"name": "scan"}]}))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/requests")
        .json(&json!({
            "agent_id": "security-scanner",
            "capability": "scan",
            "payload": {"path": "/repo"},
            "trace_id": "trace-1",
        }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({"findings": []}));
    assert_eq!(body["trace_id"], "trace-1");
    assert!(body.get("error").is_none());
    assert_eq!(agent.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_request_is_still_200() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;

    let resp = server
        .post("/api/v1/requests")
        .json(&json!({"agent_id": "ghost", "capability": "scan"}))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "agent ghost not registered");
    assert_eq!(body["error_code"], "AGENT_NOT_REGISTERED");
    assert!(body.get("data").is_none());
    Ok(())
}

// -- Audit --------------------------------------------------------------------

#[tokio::test]
async fn audit_query_filters_by_agent_and_time() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;
    for agent_id in ["a", "b", "a"] {
        server
            .post("/api/v1/requests")
            .json(&json!({"agent_id": agent_id, "capability": "scan"}))
            .await
            .assert_status_ok();
    }

    let all: Vec<Value> = server.get("/api/v1/audit").await.json();
    assert_eq!(all.len(), 3);

    let only_a: Vec<Value> = server.get("/api/v1/audit?agent_id=a").await.json();
    assert_eq!(only_a.len(), 2);
    assert!(only_a.iter().all(|e| e["agent_id"] == "a" && e["success"].as_bool() == Some(false)));

    let future: Vec<Value> = server.get("/api/v1/audit?since=2999-01-01T00:00:00Z").await.json();
    assert!(future.is_empty());

    server.get("/api/v1/audit?since=yesterday").await.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

// -- Policy -------------------------------------------------------------------

#[tokio::test]
async fn policy_reload_applies_new_rules() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("policy.json");
    std::fs::write(&path, r#"{"blacklist": {"agents": []}}"#)?;
    let mut config = test_config(None);
    config.policy = Some(path.clone());

    let agent = MockAgent::ok("scan", json!({})).await?;
    let server = test_server(running(config).await?)?;
    server
        .post("/api/v1/agents")
        .json(&json!({"agent_id": "malicious-bot", "endpoint": agent.url}))
        .await
        .assert_status_ok();
    let request = json!({"agent_id": "malicious-bot", "capability": "scan"});

    let before: Value = server.post("/api/v1/requests").json(&request).await.json();
    assert_eq!(before["success"], true);

    std::fs::write(&path, r#"{"blacklist": {"agents": ["malicious-*"]}}"#)?;
    let resp = server.post("/api/v1/policy/reload").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["reloaded"], true);

    let after: Value = server.post("/api/v1/requests").json(&request).await.json();
    assert_eq!(after["error_code"], "POLICY_VIOLATION");
    assert_eq!(agent.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn policy_reload_keeps_old_rules_on_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, "whitelist:\n  capabilities: [scan]\n")?;
    let mut config = test_config(None);
    config.policy = Some(path.clone());
    let broker = running(config).await?;
    let server = test_server(Arc::clone(&broker))?;

    std::fs::write(&path, "blacklist:\n  agents: ['mal*icious']\n")?;
    let resp = server.post("/api/v1/policy/reload").await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    assert!(broker.policy().is_capability_allowed("scan"));
    assert!(!broker.policy().is_capability_allowed("lint"));
    Ok(())
}

#[tokio::test]
async fn policy_reload_without_file_is_rejected() -> anyhow::Result<()> {
    let server = test_server(running(test_config(None)).await?)?;
    server.post("/api/v1/policy/reload").await.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_required_except_health() -> anyhow::Result<()> {
    let mut config = test_config(None);
    config.auth_token = Some("secret".into());
    let server = test_server(running(config).await?)?;

    server.get("/api/v1/health").await.assert_status_ok();

    let resp = server.get("/api/v1/audit").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    server
        .get("/api/v1/audit")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
        .await
        .assert_status_ok();
    Ok(())
}
