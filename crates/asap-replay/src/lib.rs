// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timestamp window and nonce replay guards (C5).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use asap_error::{AsapError, ErrorCode};
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

/// Default lower bound of the acceptance window: an envelope timestamped
/// more than this far in the past is rejected.
pub const DEFAULT_WINDOW_BEFORE: Duration = Duration::from_secs(300);

/// Default upper bound of the acceptance window: an envelope timestamped
/// more than this far in the future is rejected.
pub const DEFAULT_WINDOW_AFTER: Duration = Duration::from_secs(30);

/// Probability that any single nonce mutation triggers an expiry sweep.
/// Bounds the per-call cost to O(1) amortized even under adversarial
/// input, rather than guaranteeing a sweep on a fixed schedule.
const SWEEP_PROBABILITY: f64 = 0.01;

/// Failures from the replay guard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// Envelope timestamp fell outside the acceptance window.
    #[error("timestamp outside acceptance window")]
    StaleTimestamp,
    /// Nonce was already recorded as used.
    #[error("nonce already used")]
    NonceReuse,
}

impl ReplayError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::StaleTimestamp => {
                AsapError::new(ErrorCode::InvalidTimestamp, "envelope timestamp outside acceptance window")
            }
            Self::NonceReuse => AsapError::new(ErrorCode::NonceReuse, "nonce has already been used"),
        }
    }
}

/// The envelope timestamp acceptance window.
#[derive(Clone, Copy, Debug)]
pub struct AcceptanceWindow {
    /// How far in the past a timestamp may be.
    pub before: Duration,
    /// How far in the future a timestamp may be.
    pub after: Duration,
}

impl Default for AcceptanceWindow {
    fn default() -> Self {
        Self { before: DEFAULT_WINDOW_BEFORE, after: DEFAULT_WINDOW_AFTER }
    }
}

impl AcceptanceWindow {
    /// Reject timestamps outside `[now - before, now + after]`.
    pub fn check(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ReplayError> {
        let fallback = chrono::Duration::weeks(5200);
        let lower = now - chrono::Duration::from_std(self.before).unwrap_or(fallback);
        let upper = now + chrono::Duration::from_std(self.after).unwrap_or(fallback);
        if timestamp < lower || timestamp > upper {
            return Err(ReplayError::StaleTimestamp);
        }
        Ok(())
    }
}

/// In-memory nonce store with probabilistic expiry sweeps, guarded by a
/// single mutex around a hash map of nonce to expiry instant.
#[derive(Default)]
pub struct NonceStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl NonceStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Whether `nonce` is currently recorded as used (and not yet expired).
    #[must_use]
    pub fn is_used(&self, nonce: &str) -> bool {
        let entries = self.entries.lock().expect("nonce store lock poisoned");
        entries.get(nonce).is_some_and(|expiry| *expiry > Instant::now())
    }

    /// Record `nonce` as used until `ttl` elapses. Each call has a small
    /// independent chance of triggering a sweep of expired entries, so no
    /// single caller ever pays for sweeping the whole table and an
    /// attacker flooding fresh nonces cannot force unbounded growth.
    pub fn mark_used(&self, nonce: &str, ttl: Duration) {
        let mut entries = self.entries.lock().expect("nonce store lock poisoned");
        entries.insert(nonce.to_string(), Instant::now() + ttl);
        if rand::thread_rng().gen_bool(SWEEP_PROBABILITY) {
            let now = Instant::now();
            entries.retain(|_, expiry| *expiry > now);
        }
    }

    /// Check-then-mark in one call; returns an error if the nonce was
    /// already used instead of silently overwriting its expiry.
    pub fn check_and_mark(&self, nonce: &str, ttl: Duration) -> Result<(), ReplayError> {
        if self.is_used(nonce) {
            return Err(ReplayError::NonceReuse);
        }
        self.mark_used(nonce, ttl);
        Ok(())
    }

    /// Number of entries currently tracked, including any not yet swept
    /// past expiry. For tests and metrics only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("nonce store lock poisoned").len()
    }

    /// Whether the store currently tracks no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Combines the timestamp window and an optional nonce store into the
/// single check the server pipeline runs per envelope.
#[derive(Default)]
pub struct ReplayGuard {
    window: AcceptanceWindow,
    nonces: Option<NonceStore>,
}

impl ReplayGuard {
    /// Build a guard with the default window and no nonce tracking.
    #[must_use]
    pub fn new() -> Self {
        Self { window: AcceptanceWindow::default(), nonces: None }
    }

    /// Opt in to nonce tracking (disabled by default per deployment).
    #[must_use]
    pub fn with_nonce_store(mut self) -> Self {
        self.nonces = Some(NonceStore::new());
        self
    }

    /// Use an explicit acceptance window instead of the default.
    #[must_use]
    pub fn with_window(mut self, window: AcceptanceWindow) -> Self {
        self.window = window;
        self
    }

    /// Run the full replay check: timestamp window, then nonce reuse when
    /// nonce tracking is enabled and `nonce` is `Some`.
    pub fn check(
        &self,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        nonce: Option<&str>,
        nonce_ttl: Duration,
    ) -> Result<(), ReplayError> {
        self.window.check(timestamp, now)?;
        if let (Some(store), Some(nonce)) = (&self.nonces, nonce) {
            store.check_and_mark(nonce, nonce_ttl)?;
        }
        Ok(())
    }
}
