// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{RateLimiter, WINDOW};

#[test]
fn unconfigured_agent_is_unbounded() {
    let limiter = RateLimiter::new();
    for _ in 0..1000 {
        assert!(limiter.check_rate_limit("free"));
        limiter.record_request("free");
    }
    assert!(limiter.try_acquire("free"));
    assert!(limiter.snapshot("free").is_none());
}

#[test]
fn fourth_request_in_window_is_refused() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 3);
    for _ in 0..3 {
        assert!(limiter.check_rate_limit("a"));
        limiter.record_request("a");
    }
    assert!(!limiter.check_rate_limit("a"));
}

#[test]
fn check_does_not_consume_quota() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 1);
    for _ in 0..5 {
        assert!(limiter.check_rate_limit("a"));
    }
    assert!(limiter.try_acquire("a"));
    assert!(!limiter.try_acquire("a"));
}

#[test]
fn window_resets_only_after_it_elapses() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 2);
    let t0 = Instant::now();

    assert!(limiter.try_acquire_at("a", t0));
    assert!(limiter.try_acquire_at("a", t0 + Duration::from_secs(10)));
    assert!(!limiter.try_acquire_at("a", t0 + Duration::from_secs(59)));
    // Exactly at the boundary the window is still open.
    assert!(!limiter.try_acquire_at("a", t0 + WINDOW));

    let later = t0 + WINDOW + Duration::from_millis(1);
    assert!(limiter.try_acquire_at("a", later));
    let state = limiter.snapshot("a");
    assert_eq!(state.as_ref().map(|s| s.count), Some(1));
    assert_eq!(state.and_then(|s| s.window_start), Some(later));
}

#[test]
fn window_is_anchored_at_first_request() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 1);
    assert_eq!(limiter.snapshot("a").and_then(|s| s.window_start), None);

    let t0 = Instant::now() + Duration::from_secs(30);
    assert!(limiter.try_acquire_at("a", t0));
    assert_eq!(limiter.snapshot("a").and_then(|s| s.window_start), Some(t0));
}

#[test]
fn raising_limit_keeps_count() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 1);
    assert!(limiter.try_acquire("a"));
    assert!(!limiter.try_acquire("a"));

    limiter.set_limit("a", 2);
    assert_eq!(limiter.limit("a"), Some(2));
    assert!(limiter.try_acquire("a"));
    assert!(!limiter.try_acquire("a"));
}

#[test]
fn clear_limit_makes_agent_unbounded() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 1);
    assert!(limiter.try_acquire("a"));
    limiter.clear_limit("a");
    assert!(limiter.try_acquire("a"));
    assert_eq!(limiter.limit("a"), None);
}

#[test]
fn retire_keeps_an_open_window() {
    let limiter = RateLimiter::new();
    let t0 = Instant::now();
    limiter.set_limit("a", 1);
    assert!(limiter.try_acquire_at("a", t0));

    limiter.retire_at("a", t0 + Duration::from_secs(1));
    limiter.set_limit("a", 1);
    assert!(!limiter.try_acquire_at("a", t0 + Duration::from_secs(2)));

    limiter.retire_at("a", t0 + WINDOW + Duration::from_secs(1));
    assert!(limiter.snapshot("a").is_none());
}

#[test]
fn retire_drops_an_unused_quota() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 5);
    limiter.retire("a");
    assert_eq!(limiter.limit("a"), None);
}

#[test]
fn agents_have_independent_quotas() {
    let limiter = RateLimiter::new();
    limiter.set_limit("a", 1);
    limiter.set_limit("b", 1);
    assert!(limiter.try_acquire("a"));
    assert!(!limiter.try_acquire("a"));
    assert!(limiter.try_acquire("b"));
}

#[test]
fn concurrent_acquire_never_exceeds_limit() {
    let limiter = Arc::new(RateLimiter::new());
    limiter.set_limit("hot", 10);
    let admitted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                for _ in 0..4 {
                    if limiter.try_acquire("hot") {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().is_ok());
    }

    assert_eq!(admitted.load(Ordering::Relaxed), 10);
    assert_eq!(limiter.snapshot("hot").map(|s| s.count), Some(10));
}
