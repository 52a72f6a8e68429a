// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::time::Duration;

use clap::Parser;

use super::BrokerConfig;

fn parse(args: &[&str]) -> BrokerConfig {
    BrokerConfig::parse_from(args)
}

#[test]
fn defaults() -> anyhow::Result<()> {
    let config = parse(&["a2a-broker"]);
    config.validate()?;
    assert_eq!(config.listen_addr(), "127.0.0.1:8090");
    assert_eq!(config.max_connections, 100);
    assert_eq!(config.default_timeout(), Duration::from_secs(30));
    assert!(config.audit_enabled);
    assert!(!config.mtls_enabled);
    assert_eq!(config.default_rate_limit_per_minute, 100);
    assert_eq!(config.retry_attempts, 0);
    assert_eq!(config.audit_path(), Some(Path::new("logs/audit")));
    Ok(())
}

#[test]
fn audit_can_be_disabled() -> anyhow::Result<()> {
    let config = parse(&["a2a-broker", "--audit", "false"]);
    config.validate()?;
    assert!(!config.audit_enabled);
    assert_eq!(config.audit_path(), None);
    Ok(())
}

#[test]
fn mtls_with_all_material() -> anyhow::Result<()> {
    let config = parse(&[
        "a2a-broker",
        "--mtls",
        "--tls-cert",
        "/etc/a2a/cert.pem",
        "--tls-key",
        "/etc/a2a/key.pem",
        "--tls-ca",
        "/etc/a2a/ca.pem",
    ]);
    config.validate()?;
    assert!(config.mtls_enabled);
    Ok(())
}

#[yare::parameterized(
    mtls_missing_ca  = { &["a2a-broker", "--mtls", "--tls-cert", "c", "--tls-key", "k"], "--mtls requires" },
    zero_connections = { &["a2a-broker", "--max-connections", "0"], "--max-connections" },
    zero_timeout     = { &["a2a-broker", "--default-timeout-secs", "0"], "--default-timeout-secs" },
    bad_log_format   = { &["a2a-broker", "--log-format", "xml"], "invalid --log-format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn retry_knobs() {
    let config = parse(&["a2a-broker", "--retry-attempts", "2", "--retry-delay-secs", "3"]);
    assert_eq!(config.retry_attempts, 2);
    assert_eq!(config.retry_delay(), Duration::from_secs(3));
}
