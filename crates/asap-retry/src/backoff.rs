// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exponential backoff with jitter, shared by the HTTP client and webhook
//! dispatcher retry policies.

use std::time::Duration;

use rand::Rng;

/// Whether an outcome should be retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retriable {
    /// Safe to retry: connection error, timeout, or a 5xx response.
    Yes,
    /// Must not retry: a 4xx response or a non-transient failure.
    No,
}

/// `min(max_delay, base * 2^attempt) + U(0, 0.5)` seconds, attempt
/// starting at 0 for the first retry.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, max_delay: Duration) -> Duration {
    let exponential = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exponential.min(max_delay);
    let jitter = rand::thread_rng().gen_range(0.0..0.5);
    capped + Duration::from_secs_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_the_max_delay_cap() {
        let delay = backoff_delay(20, Duration::from_millis(100), Duration::from_secs(5));
        assert!(delay <= Duration::from_secs(5) + Duration::from_millis(500));
    }

    #[test]
    fn grows_exponentially_before_the_cap() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(60);
        // Jitter is bounded by 0.5s; at attempt 2 the exponential term alone
        // (400ms) already exceeds attempt 0's worst case (100ms + 500ms).
        let second = backoff_delay(2, base, cap);
        assert!(second >= Duration::from_millis(400));
    }

    #[test]
    fn jitter_is_bounded() {
        for attempt in 0..5 {
            let delay = backoff_delay(attempt, Duration::from_secs(1), Duration::from_secs(10));
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(2) + Duration::from_millis(500));
        }
    }

    proptest::proptest! {
        /// For any attempt/base/cap, the delay never exceeds `cap + 0.5s`
        /// and never falls below `min(base, cap)`: the jitter term only
        /// ever adds, never subtracts, and the exponential term is always
        /// capped before jitter is applied.
        #[test]
        fn delay_stays_within_the_capped_plus_jitter_bound(
            attempt in 0u32..40,
            base_millis in 1u64..5_000,
            cap_millis in 1u64..60_000,
        ) {
            let base = Duration::from_millis(base_millis);
            let cap = Duration::from_millis(cap_millis);
            let delay = backoff_delay(attempt, base, cap);
            prop_assert!(delay >= base.min(cap));
            prop_assert!(delay <= cap + Duration::from_millis(500));
        }
    }
}
