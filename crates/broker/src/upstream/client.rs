// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for invoking capabilities on registered agents.

use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::auth::TlsMaterial;
use crate::config::BrokerConfig;
use crate::error::DispatchError;

/// Upstream error bodies are truncated to this many characters.
const MAX_ERROR_DETAIL: usize = 256;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Shared outbound client. One connection pool serves every agent.
pub struct AgentClient {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl AgentClient {
    /// Build the client, presenting `tls` as the client identity when set.
    pub fn new(config: &BrokerConfig, tls: Option<&TlsMaterial>) -> anyhow::Result<Self> {
        ensure_crypto();
        let mut builder = Client::builder().pool_max_idle_per_host(config.max_connections);
        if let Some(tls) = tls {
            let identity = reqwest::Identity::from_pem(&tls.identity_pem())
                .map_err(|e| anyhow::anyhow!("invalid TLS client identity: {e}"))?;
            let ca = reqwest::Certificate::from_pem(&tls.ca_pem)
                .map_err(|e| anyhow::anyhow!("invalid TLS CA bundle: {e}"))?;
            builder = builder.identity(identity).add_root_certificate(ca);
        }
        let client =
            builder.build().map_err(|e| anyhow::anyhow!("failed to build agent client: {e}"))?;
        Ok(Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay(),
        })
    }

    /// `POST {endpoint}/{capability}` with `payload` as the JSON body.
    ///
    /// `timeout` bounds each attempt end to end, connect included.
    ///
    /// Connection failures are retried up to `retry_attempts` times; every
    /// other failure is returned as-is.
    pub async fn invoke(
        &self,
        endpoint: &str,
        capability: &str,
        payload: &Value,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Value, DispatchError> {
        let url = format!("{endpoint}/{capability}");
        let mut attempt = 0;
        loop {
            match self.invoke_once(&url, payload, timeout, trace_id).await {
                Err(e) if e.is_retryable() && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        url = %url,
                        trace_id,
                        attempt,
                        err = %e,
                        "agent call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn invoke_once(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<Value, DispatchError> {
        let call = async {
            let resp = self
                .client
                .post(url)
                .header("x-trace-id", trace_id)
                .json(payload)
                .send()
                .await
                .map_err(|e| classify(&e, timeout))?;

            let status = resp.status();
            if status != StatusCode::OK {
                let body = resp.text().await.unwrap_or_default();
                return Err(DispatchError::UpstreamError {
                    status: status.as_u16(),
                    detail: truncate(body.trim()),
                });
            }

            let bytes = resp.bytes().await.map_err(|e| classify(&e, timeout))?;
            serde_json::from_slice(&bytes).map_err(|e| DispatchError::UpstreamError {
                status: status.as_u16(),
                detail: format!("invalid JSON body: {e}"),
            })
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::UpstreamTimeout { after: timeout }),
        }
    }
}

fn classify(err: &reqwest::Error, timeout: Duration) -> DispatchError {
    if err.is_timeout() {
        return DispatchError::UpstreamTimeout { after: timeout };
    }
    DispatchError::TransportError { detail: error_chain(err) }
}

/// Render an error with its sources, `outer: inner: innermost`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_ERROR_DETAIL) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_owned(),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
