// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: config builders, mock agents, and assertion helpers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;

/// Broker config for tests: ephemeral port, short timeouts, no rate limit
/// defaults, audit files under `audit_dir` when given.
pub fn test_config(audit_dir: Option<&Path>) -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".into(),
        listen_port: 0,
        max_connections: 16,
        default_timeout_secs: 5,
        mtls_enabled: false,
        tls_cert: None,
        tls_key: None,
        tls_ca: None,
        audit_enabled: true,
        audit_dir: audit_dir.map(Path::to_path_buf),
        default_rate_limit_per_minute: 0,
        retry_attempts: 0,
        retry_delay_secs: 0,
        policy: None,
        auth_token: None,
        drain_timeout_secs: 2,
        log_format: "text".into(),
        log_level: "debug".into(),
    }
}

/// An in-process agent serving one capability on an ephemeral port.
///
/// Counts hits and remembers the last payload. Stops serving on drop.
pub struct MockAgent {
    pub url: String,
    hits: Arc<AtomicUsize>,
    last_payload: Arc<Mutex<Option<Value>>>,
    shutdown: CancellationToken,
}

impl MockAgent {
    /// Answer `POST /{capability}` with `status` and `body` after `delay`.
    pub async fn start(
        capability: &str,
        status: StatusCode,
        body: Value,
        delay: Duration,
    ) -> anyhow::Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let last_payload = Arc::new(Mutex::new(None));

        let handler_hits = Arc::clone(&hits);
        let handler_payload = Arc::clone(&last_payload);
        let router = Router::new().route(
            &format!("/{capability}"),
            post(move |Json(payload): Json<Value>| {
                let hits = Arc::clone(&handler_hits);
                let last = Arc::clone(&handler_payload);
                let body = body.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    *last.lock() = Some(payload);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    (status, Json(body))
                }
            }),
        );

        let (url, shutdown) = Self::serve(router).await?;
        Ok(Self { url, hits, last_payload, shutdown })
    }

    /// Answer `POST /{capability}` with 200 and `body` immediately.
    pub async fn ok(capability: &str, body: Value) -> anyhow::Result<Self> {
        Self::start(capability, StatusCode::OK, body, Duration::ZERO).await
    }

    async fn serve(router: Router) -> anyhow::Result<(String, CancellationToken)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(stop.cancelled_owned()).await;
        });
        Ok((format!("http://{addr}"), shutdown))
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<Value> {
        self.last_payload.lock().clone()
    }
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A base URL on which nothing is listening.
pub fn dead_endpoint() -> anyhow::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
