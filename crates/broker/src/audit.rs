// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit trail of handled requests.
//!
//! Entries are kept in memory in insertion order and appended as JSONL to one
//! file per UTC calendar day (`audit-YYYY-MM-DD.jsonl`). File failures are
//! logged and counted but never fail the request path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::types::{AgentRequest, AgentResponse};

/// One handled request's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub capability: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl AuditEntry {
    pub fn from_exchange(request: &AgentRequest, response: &AgentResponse) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: request.agent_id.clone(),
            capability: request.capability.clone(),
            success: response.success,
            duration_ms: response.duration_ms,
            error: response.error.clone(),
            trace_id: response.trace_id.clone().or_else(|| request.trace_id.clone()),
        }
    }
}

/// The currently open day file.
struct DayFile {
    date: NaiveDate,
    file: tokio::fs::File,
}

pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    dir: Option<PathBuf>,
    writer: tokio::sync::Mutex<Option<DayFile>>,
    write_failures: AtomicU64,
}

impl AuditLogger {
    /// Create a logger. With `dir` unset, entries are kept in memory only.
    pub fn new(dir: Option<&Path>) -> Self {
        if let Some(dir) = dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), err = %e, "cannot create audit directory");
            }
        }
        Self {
            entries: Mutex::new(Vec::new()),
            dir: dir.map(Path::to_path_buf),
            writer: tokio::sync::Mutex::new(None),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("audit-{}.jsonl", date.format("%Y-%m-%d"))
    }

    /// Path of the log file for `date`, if file logging is configured.
    pub fn path_for(&self, date: NaiveDate) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(Self::file_name(date)))
    }

    /// Record one request/response pair.
    pub async fn log_request(&self, request: &AgentRequest, response: &AgentResponse) {
        self.append(AuditEntry::from_exchange(request, response)).await;
    }

    pub async fn append(&self, entry: AuditEntry) {
        self.entries.lock().push(entry.clone());

        if self.dir.is_none() {
            return;
        }
        if let Err(e) = self.write_line(&entry).await {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(agent_id = %entry.agent_id, err = %e, "audit file write failed");
        }
    }

    async fn write_line(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let date = entry.timestamp.date_naive();
        let path = self.path_for(date).ok_or_else(|| anyhow::anyhow!("no audit directory"))?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let rotate = writer.as_ref().is_none_or(|open| open.date != date);
        if rotate {
            let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
            *writer = Some(DayFile { date, file });
        }
        let open = writer.as_mut().ok_or_else(|| anyhow::anyhow!("audit file not open"))?;
        open.file.write_all(line.as_bytes()).await?;
        open.file.flush().await?;
        Ok(())
    }

    /// Sync the open day file to disk.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().await;
        if let Some(open) = writer.as_mut() {
            open.file.flush().await?;
            open.file.sync_data().await?;
        }
        Ok(())
    }

    /// Entries matching every supplied filter, in insertion order.
    pub fn query(&self, since: Option<DateTime<Utc>>, agent_id: Option<&str>) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| since.is_none_or(|t| e.timestamp >= t))
            .filter(|e| agent_id.is_none_or(|id| e.agent_id == id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Parse a day file back into entries, skipping lines that do not parse.
    pub fn read_file(path: &Path) -> anyhow::Result<Vec<AuditEntry>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str::<AuditEntry>(line).ok())
            .collect())
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
