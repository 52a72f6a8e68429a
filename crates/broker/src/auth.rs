// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual-TLS material and per-agent shared secrets.
//!
//! The TLS material is consumed by the outbound agent client; shared secrets
//! guard agent self-management on the inbound API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// PEM material for outbound mutual TLS.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub ca_pem: Vec<u8>,
}

impl TlsMaterial {
    /// Client certificate followed by its key, the form reqwest's rustls
    /// identity expects.
    pub fn identity_pem(&self) -> Vec<u8> {
        let mut pem = self.cert_pem.clone();
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        pem.extend_from_slice(&self.key_pem);
        pem
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .field("ca_pem", &self.ca_pem.len())
            .finish()
    }
}

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[derive(Default)]
pub struct AuthManager {
    tls: RwLock<Option<Arc<TlsMaterial>>>,
    secrets: RwLock<HashMap<String, String>>,
}

impl AuthManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load certificate, key and CA bundle. All three must be readable;
    /// on failure the manager stays in its previous state.
    pub fn setup_mutual_tls(
        &self,
        cert_path: &Path,
        key_path: &Path,
        ca_path: &Path,
    ) -> anyhow::Result<()> {
        let read = |kind: &str, path: &Path| -> anyhow::Result<Vec<u8>> {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("cannot read TLS {kind} {}: {e}", path.display()))?;
            if bytes.is_empty() {
                anyhow::bail!("TLS {kind} {} is empty", path.display());
            }
            Ok(bytes)
        };
        let material = TlsMaterial {
            cert_pem: read("certificate", cert_path)?,
            key_pem: read("key", key_path)?,
            ca_pem: read("CA bundle", ca_path)?,
        };
        *self.tls.write() = Some(Arc::new(material));
        tracing::info!(cert = %cert_path.display(), ca = %ca_path.display(), "mutual TLS enabled");
        Ok(())
    }

    pub fn is_mutual_tls_enabled(&self) -> bool {
        self.tls.read().is_some()
    }

    pub fn tls_material(&self) -> Option<Arc<TlsMaterial>> {
        self.tls.read().clone()
    }

    pub fn register_agent(&self, agent_id: &str, shared_secret: &str) {
        self.secrets.write().insert(agent_id.to_owned(), shared_secret.to_owned());
    }

    pub fn remove_agent(&self, agent_id: &str) -> bool {
        self.secrets.write().remove(agent_id).is_some()
    }

    pub fn has_secret(&self, agent_id: &str) -> bool {
        self.secrets.read().contains_key(agent_id)
    }

    /// No registered secret is a denial, not an error.
    pub fn authenticate(&self, agent_id: &str, supplied_secret: &str) -> bool {
        match self.secrets.read().get(agent_id) {
            Some(expected) => constant_time_eq(expected, supplied_secret),
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
