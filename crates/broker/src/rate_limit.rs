// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent request quotas over a fixed 60-second window.
//!
//! The window is anchored at the first request an agent makes and restarts
//! only once it has fully elapsed; this is not a sliding window. Agents with
//! no configured limit are always admitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

/// Length of one rate-limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Quota bookkeeping for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests admitted per window.
    pub limit: u32,
    /// `None` until the first request.
    pub window_start: Option<Instant>,
    pub count: u32,
}

impl RateLimitState {
    fn new(limit: u32) -> Self {
        Self { limit, window_start: None, count: 0 }
    }

    /// Start a fresh window if none is open or the current one has elapsed.
    fn roll(&mut self, now: Instant) {
        if !self.is_open(now) {
            self.window_start = Some(now);
            self.count = 0;
        }
    }

    fn is_open(&self, now: Instant) -> bool {
        self.window_start.is_some_and(|start| now <= start + WINDOW)
    }

    fn has_capacity(&self) -> bool {
        self.count < self.limit
    }
}

/// Enforces per-agent request rates.
///
/// Each agent's state sits behind its own mutex so that check-then-record is
/// atomic per agent without serializing unrelated agents.
#[derive(Default)]
pub struct RateLimiter {
    states: RwLock<HashMap<String, Arc<Mutex<RateLimitState>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, agent_id: &str) -> Option<Arc<Mutex<RateLimitState>>> {
        self.states.read().get(agent_id).map(Arc::clone)
    }

    /// Set or change an agent's limit. The current window and count are kept.
    pub fn set_limit(&self, agent_id: &str, requests_per_minute: u32) {
        if let Some(state) = self.state(agent_id) {
            state.lock().limit = requests_per_minute;
            return;
        }
        self.states
            .write()
            .entry(agent_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitState::new(requests_per_minute))))
            .lock()
            .limit = requests_per_minute;
        tracing::debug!(agent_id, requests_per_minute, "rate limit set");
    }

    /// Drop an agent's limit, making it unbounded again.
    pub fn clear_limit(&self, agent_id: &str) {
        self.states.write().remove(agent_id);
    }

    /// Forget an agent's quota unless its current window is still open.
    ///
    /// An open window outlives the agent, so unregistering and registering
    /// again within it picks up the same count.
    pub fn retire(&self, agent_id: &str) {
        self.retire_at(agent_id, Instant::now());
    }

    pub fn retire_at(&self, agent_id: &str, now: Instant) {
        let mut states = self.states.write();
        let open = states.get(agent_id).is_some_and(|s| s.lock().is_open(now));
        if !open {
            states.remove(agent_id);
        }
    }

    pub fn limit(&self, agent_id: &str) -> Option<u32> {
        self.state(agent_id).map(|s| s.lock().limit)
    }

    /// Snapshot of an agent's quota state.
    pub fn snapshot(&self, agent_id: &str) -> Option<RateLimitState> {
        self.state(agent_id).map(|s| s.lock().clone())
    }

    /// Whether another request would be admitted now. Does not consume quota.
    pub fn check_rate_limit(&self, agent_id: &str) -> bool {
        self.check_rate_limit_at(agent_id, Instant::now())
    }

    pub fn check_rate_limit_at(&self, agent_id: &str, now: Instant) -> bool {
        let Some(state) = self.state(agent_id) else {
            return true;
        };
        let mut state = state.lock();
        state.roll(now);
        state.has_capacity()
    }

    /// Count one request against the agent's window.
    pub fn record_request(&self, agent_id: &str) {
        self.record_request_at(agent_id, Instant::now());
    }

    pub fn record_request_at(&self, agent_id: &str, now: Instant) {
        let Some(state) = self.state(agent_id) else {
            return;
        };
        let mut state = state.lock();
        state.roll(now);
        state.count = state.count.saturating_add(1);
    }

    /// Check and record as one step under the agent's lock.
    ///
    /// This is what the request pipeline uses: two concurrent callers can
    /// never both observe the last free slot.
    pub fn try_acquire(&self, agent_id: &str) -> bool {
        self.try_acquire_at(agent_id, Instant::now())
    }

    pub fn try_acquire_at(&self, agent_id: &str, now: Instant) -> bool {
        let Some(state) = self.state(agent_id) else {
            return true;
        };
        let mut state = state.lock();
        state.roll(now);
        if !state.has_capacity() {
            return false;
        }
        state.count += 1;
        true
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
