//! `task.request` idempotency cache. Scoped per recipient agent: the key
//! is `(recipient, idempotency_key)`, matching the envelope field model
//! where `idempotency_key` lives inside a payload addressed to exactly one
//! recipient. A duplicate request under the same key returns the original
//! reply rather than dispatching the skill again.
//!
//! `idempotency_key` is caller-supplied, so the cache caps its size with
//! FIFO eviction rather than growing without bound under an attacker
//! minting fresh keys.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use asap_core::Envelope;
use tokio::sync::RwLock;

const MAX_ENTRIES: usize = 10_000;

type Key = (String, String);

#[derive(Default)]
struct State {
    entries: HashMap<Key, Envelope>,
    order: VecDeque<Key>,
}

/// Shared, lock-guarded cache of completed `task.request` replies.
#[derive(Clone, Default)]
pub struct IdempotencyCache {
    inner: Arc<RwLock<State>>,
}

impl IdempotencyCache {
    /// Build an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the reply previously recorded for `(recipient, key)`, if any.
    pub async fn get(&self, recipient: &str, key: &str) -> Option<Envelope> {
        self.inner.read().await.entries.get(&(recipient.to_string(), key.to_string())).cloned()
    }

    /// Record `reply` as the result for `(recipient, key)`. Does not
    /// overwrite an existing entry: the first reply for a key wins, so a
    /// race between two duplicate submissions cannot clobber the
    /// original's result with a second, differently-timed one.
    pub async fn put_if_absent(&self, recipient: &str, key: &str, reply: Envelope) {
        let mut state = self.inner.write().await;
        let cache_key = (recipient.to_string(), key.to_string());
        if state.entries.contains_key(&cache_key) {
            return;
        }
        state.entries.insert(cache_key.clone(), reply);
        state.order.push_back(cache_key);
        while state.entries.len() > MAX_ENTRIES {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}
