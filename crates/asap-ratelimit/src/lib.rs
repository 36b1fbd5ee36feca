// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multi-window token-bucket rate limiting keyed by sender identity (C6).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use asap_error::{AsapError, ErrorCode};
use serde::{Deserialize, Serialize};

/// One `{window, max}` rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Length of the fixed window.
    #[serde(with = "asap_duration_serde::duration_millis")]
    pub window: Duration,
    /// Maximum requests admitted within one window.
    pub max: u64,
}

/// Configuration for a [`RateLimiter`]: the set of rules every key is
/// checked against. Defaults to `10/second; 100/minute`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Rules evaluated, in order, for every key.
    pub rules: Vec<RateLimitRule>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                RateLimitRule { window: Duration::from_secs(1), max: 10 },
                RateLimitRule { window: Duration::from_secs(60), max: 100 },
            ],
        }
    }
}

/// The rule a key failed, plus when it next has room.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitRejection {
    /// The rule that was exceeded.
    pub rule: RateLimitRule,
    /// Seconds until that rule's window resets.
    pub retry_after_seconds: u64,
}

impl RateLimitRejection {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        AsapError::new(ErrorCode::RateLimited, "rate limit exceeded")
            .with_context("window_seconds", self.rule.window.as_secs())
            .with_context("max", self.rule.max)
            .with_context("retry_after_seconds", self.retry_after_seconds)
    }
}

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u64,
}

#[derive(Debug)]
struct KeyState {
    windows: Vec<Window>,
}

impl KeyState {
    fn new(now: Instant, rule_count: usize) -> Self {
        Self { windows: (0..rule_count).map(|_| Window { start: now, count: 0 }).collect() }
    }
}

/// Derives the rate-limit key: the envelope sender when present, else the
/// client address, per §4.6.
#[must_use]
pub fn identity_key<'a>(sender: Option<&'a str>, client_addr: &'a str) -> &'a str {
    sender.unwrap_or(client_addr)
}

/// Rate limiter evaluating a [`RateLimiterConfig`] per key.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<HashMap<String, KeyState>>,
}

impl RateLimiter {
    /// Build a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, state: Mutex::new(HashMap::new()) }
    }

    /// Two-phase check for `key` at `now`: every rule is first checked for
    /// `would_exceed?` without mutating any counter; only if all rules pass
    /// are all counters incremented, under the same lock acquisition. This
    /// is what prevents the double-counting drift a naive
    /// check-then-increment-separately scheme would have under
    /// concurrent callers.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), RateLimitRejection> {
        let mut state = self.state.lock().expect("rate limiter state poisoned");
        let entry = state
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now, self.config.rules.len()));

        for (window, rule) in entry.windows.iter_mut().zip(&self.config.rules) {
            if now.duration_since(window.start) >= rule.window {
                window.start = now;
                window.count = 0;
            }
        }

        for (window, rule) in entry.windows.iter().zip(&self.config.rules) {
            if window.count >= rule.max {
                let reset_at = window.start + rule.window;
                let retry_after_seconds = reset_at.saturating_duration_since(now).as_secs_f64().ceil() as u64;
                return Err(RateLimitRejection { rule: rule.clone(), retry_after_seconds });
            }
        }

        for window in &mut entry.windows {
            window.count += 1;
        }
        Ok(())
    }
}
