// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-key circuit breaker: CLOSED → OPEN after consecutive failures,
//! OPEN → HALF_OPEN after a cooldown, HALF_OPEN → CLOSED on a successful
//! probe or back to OPEN on failure.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable state of a single breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through normally.
    Closed,
    /// Requests are rejected without attempting the call.
    Open,
    /// A single probe request is allowed through to test recovery.
    HalfOpen,
}

struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self { state: CircuitState::Closed, consecutive_failures: 0, opened_at: None }
    }
}

/// Tracks one circuit breaker per key (typically a client base URL).
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    open_duration: Duration,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    /// Build a registry: trip to OPEN after `failure_threshold` consecutive
    /// failures, stay OPEN for `open_duration` before allowing a probe.
    #[must_use]
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self { failure_threshold, open_duration, breakers: Mutex::new(HashMap::new()) }
    }

    /// Whether a request to `key` is currently allowed. A breaker that has
    /// been OPEN for longer than `open_duration` transitions to HALF_OPEN
    /// and allows exactly one probe through.
    pub fn allow_request(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock().expect("circuit breaker registry lock poisoned");
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = breaker.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.open_duration {
                    breaker.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call against `key`.
    pub fn on_success(&self, key: &str) {
        let mut breakers = self.breakers.lock().expect("circuit breaker registry lock poisoned");
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);
        breaker.state = CircuitState::Closed;
        breaker.consecutive_failures = 0;
        breaker.opened_at = None;
    }

    /// Record a failed call against `key`, tripping the breaker if the
    /// consecutive-failure threshold is reached (or re-opening it
    /// immediately if the failure happened during a half-open probe).
    pub fn on_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock().expect("circuit breaker registry lock poisoned");
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);
        if breaker.state == CircuitState::HalfOpen {
            breaker.state = CircuitState::Open;
            breaker.opened_at = Some(Instant::now());
            return;
        }
        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= self.failure_threshold {
            breaker.state = CircuitState::Open;
            breaker.opened_at = Some(Instant::now());
        }
    }

    /// Current state of `key`'s breaker, without mutating it.
    #[must_use]
    pub fn state(&self, key: &str) -> CircuitState {
        let breakers = self.breakers.lock().expect("circuit breaker registry lock poisoned");
        breakers.get(key).map(|b| b.state).unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_consecutive_failures() {
        let registry = CircuitBreakerRegistry::new(3, Duration::from_secs(30));
        registry.on_failure("https://a");
        registry.on_failure("https://a");
        assert_eq!(registry.state("https://a"), CircuitState::Closed);
        registry.on_failure("https://a");
        assert_eq!(registry.state("https://a"), CircuitState::Open);
    }

    #[test]
    fn open_rejects_requests_immediately() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(30));
        registry.on_failure("https://a");
        assert!(!registry.allow_request("https://a"));
    }

    #[test]
    fn half_open_allows_exactly_one_probe() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_millis(0));
        registry.on_failure("https://a");
        assert!(registry.allow_request("https://a"));
        assert_eq!(registry.state("https://a"), CircuitState::HalfOpen);
        assert!(!registry.allow_request("https://a"));
    }

    #[test]
    fn success_closes_a_half_open_breaker() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_millis(0));
        registry.on_failure("https://a");
        registry.allow_request("https://a");
        registry.on_success("https://a");
        assert_eq!(registry.state("https://a"), CircuitState::Closed);
        assert!(registry.allow_request("https://a"));
    }

    #[test]
    fn failure_during_half_open_reopens() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_millis(0));
        registry.on_failure("https://a");
        registry.allow_request("https://a");
        registry.on_failure("https://a");
        assert_eq!(registry.state("https://a"), CircuitState::Open);
    }

    #[test]
    fn keys_are_independent() {
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(30));
        registry.on_failure("https://a");
        assert_eq!(registry.state("https://a"), CircuitState::Open);
        assert_eq!(registry.state("https://b"), CircuitState::Closed);
    }
}
