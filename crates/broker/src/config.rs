// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the A2A broker.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "a2a-broker", version, about = "Agent-to-agent request broker")]
pub struct BrokerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "A2A_BROKER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long = "port", default_value_t = 8090, env = "A2A_BROKER_PORT")]
    pub listen_port: u16,

    /// Maximum concurrently served inbound requests.
    #[arg(long, default_value_t = 100, env = "A2A_BROKER_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Timeout for outbound agent calls when the request carries none.
    #[arg(long, default_value_t = 30, env = "A2A_BROKER_DEFAULT_TIMEOUT_SECS")]
    pub default_timeout_secs: u64,

    /// Present a client certificate to agents and verify them against a CA.
    #[arg(long = "mtls", env = "A2A_BROKER_MTLS")]
    pub mtls_enabled: bool,

    /// Client certificate (PEM) for mutual TLS.
    #[arg(long, env = "A2A_BROKER_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS.
    #[arg(long, env = "A2A_BROKER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// CA bundle (PEM) agents' certificates are verified against.
    #[arg(long, env = "A2A_BROKER_TLS_CA")]
    pub tls_ca: Option<PathBuf>,

    /// Record every handled request in the audit log.
    #[arg(
        long = "audit",
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "A2A_BROKER_AUDIT"
    )]
    pub audit_enabled: bool,

    /// Directory for daily audit files.
    #[arg(long, default_value = "logs/audit", env = "A2A_BROKER_AUDIT_DIR")]
    pub audit_dir: Option<PathBuf>,

    /// Requests per minute applied to newly registered agents (0 = unbounded).
    #[arg(long = "default-rate-limit", default_value_t = 100, env = "A2A_BROKER_DEFAULT_RATE_LIMIT")]
    pub default_rate_limit_per_minute: u32,

    /// Extra attempts after a connection-level failure.
    #[arg(long, default_value_t = 0, env = "A2A_BROKER_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// Delay between retry attempts.
    #[arg(long, default_value_t = 1, env = "A2A_BROKER_RETRY_DELAY_SECS")]
    pub retry_delay_secs: u64,

    /// Policy document (YAML or JSON). Everything is allowed when unset.
    #[arg(long, env = "A2A_BROKER_POLICY")]
    pub policy: Option<PathBuf>,

    /// Bearer token for the inbound API. If unset, auth is disabled.
    #[arg(long, env = "A2A_BROKER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// How long shutdown waits for in-flight requests before cancelling them.
    #[arg(long, default_value_t = 10, env = "A2A_BROKER_DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "A2A_BROKER_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "A2A_BROKER_LOG_LEVEL")]
    pub log_level: String,
}

impl BrokerConfig {
    /// Reject combinations that cannot start.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mtls_enabled
            && (self.tls_cert.is_none() || self.tls_key.is_none() || self.tls_ca.is_none())
        {
            anyhow::bail!("--mtls requires --tls-cert, --tls-key and --tls-ca");
        }
        if self.max_connections == 0 {
            anyhow::bail!("--max-connections must be at least 1");
        }
        if self.default_timeout_secs == 0 {
            anyhow::bail!("--default-timeout-secs must be at least 1");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format {other:?} (expected json or text)"),
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.listen_port)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Audit directory, honoring `audit_enabled`.
    pub fn audit_path(&self) -> Option<&std::path::Path> {
        if self.audit_enabled {
            self.audit_dir.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
