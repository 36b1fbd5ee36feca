// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-connection token bucket, enforced before every outbound send.

use std::time::Instant;

use tokio::sync::Mutex;

/// A simple token bucket, refilled continuously at `refill_per_second`.
pub struct SendBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl SendBucket {
    /// Build a bucket starting full.
    #[must_use]
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    /// Attempt to take one token. Returns `false` if the bucket is empty.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = Instant::now();
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_then_refills() {
        let bucket = SendBucket::new(2.0, 1000.0);
        assert!(bucket.try_acquire().await);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(bucket.try_acquire().await);
    }
}
