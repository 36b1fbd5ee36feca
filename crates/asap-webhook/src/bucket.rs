// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-URL token bucket, capped and FIFO-evicted so an attacker who
//! registers many distinct webhook URLs cannot grow this map unbounded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Maximum distinct URL keys tracked at once.
pub const MAX_ENTRIES: usize = 10_000;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by webhook URL.
pub struct UrlBucketMap {
    capacity: f64,
    refill_per_second: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
    insertion_order: Mutex<VecDeque<String>>,
}

impl UrlBucketMap {
    /// Build a map where each key may burst up to `capacity` tokens and
    /// refills at `refill_per_second` tokens/second.
    #[must_use]
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            buckets: Mutex::new(HashMap::new()),
            insertion_order: Mutex::new(VecDeque::new()),
        }
    }

    /// Consume one token for `key`, returning whether the call is allowed.
    /// Inserting a new key beyond [`MAX_ENTRIES`] evicts the oldest key.
    pub fn try_acquire(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("url bucket map lock poisoned");
        if !buckets.contains_key(key) {
            self.evict_if_full(&mut buckets);
            buckets.insert(key.to_string(), Bucket { tokens: self.capacity, last_refill: Instant::now() });
            self.insertion_order.lock().expect("url bucket order lock poisoned").push_back(key.to_string());
        }
        let bucket = buckets.get_mut(key).expect("just inserted or already present");
        let elapsed = bucket.last_refill.elapsed();
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
        bucket.last_refill = Instant::now();
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn evict_if_full(&self, buckets: &mut HashMap<String, Bucket>) {
        if buckets.len() < MAX_ENTRIES {
            return;
        }
        let mut order = self.insertion_order.lock().expect("url bucket order lock poisoned");
        if let Some(oldest) = order.pop_front() {
            buckets.remove(&oldest);
        }
    }

    /// Number of distinct keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().expect("url bucket map lock poisoned").len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
