// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A2A broker: routes requests between registered agents under policy,
//! per-agent rate limits and an audit trail.

pub mod audit;
pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod policy;
pub mod rate_limit;
pub mod registry;
pub mod test_support;
pub mod transport;
pub mod types;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::transport::build_router;

/// Run the broker until interrupted.
pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("interrupt received, shutting down");
                    shutdown.cancel();
                }
                Err(e) => tracing::warn!(err = %e, "cannot listen for interrupts"),
            }
        });
    }

    let listener = TcpListener::bind(config.listen_addr()).await?;
    serve(config, listener, shutdown).await
}

/// Serve the broker API on `listener` until `shutdown` fires.
///
/// On shutdown the broker drains in-flight requests while axum stops
/// accepting connections.
pub async fn serve(
    config: BrokerConfig,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let broker = Broker::from_config(config)?;
    broker.start().await?;

    tracing::info!(addr = %listener.local_addr()?, "a2a broker listening");
    let router = build_router(Arc::clone(&broker));
    let stop = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router).with_graceful_shutdown(stop.cancelled_owned()).await
    });

    tokio::select! {
        _ = shutdown.cancelled() => {}
        joined = &mut server => {
            // Listener died on its own.
            broker.shutdown().await?;
            joined??;
            return Ok(());
        }
    }

    let drained = broker.shutdown().await;
    server.await??;
    drained
}
