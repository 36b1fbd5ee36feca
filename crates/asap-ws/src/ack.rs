// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ack tracking: each outbound envelope awaits a matching ack frame keyed
//! by envelope id, with a timeout that fails the pending future rather
//! than hanging forever.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

/// An outbound send timed out waiting for its ack.
#[derive(Debug, thiserror::Error)]
#[error("ack timed out for envelope {0}")]
pub struct AckTimeout(pub String);

/// Tracks pending acks by envelope id. Futures are registered on whatever
/// runtime is currently driving the connection; there is no default or
/// global executor involved.
#[derive(Default)]
pub struct AckTracker {
    pending: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl AckTracker {
    /// Build an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `envelope_id` as awaiting an ack, and wait up to
    /// `ack_timeout` for it to arrive.
    pub async fn wait_for_ack(&self, envelope_id: &str, ack_timeout: Duration) -> Result<(), AckTimeout> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(envelope_id.to_string(), tx);

        let outcome = tokio::time::timeout(ack_timeout, rx).await;
        self.pending.lock().await.remove(envelope_id);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(AckTimeout(envelope_id.to_string())),
        }
    }

    /// Resolve the pending wait for `envelope_id`, if one is registered.
    /// Acks for unknown or already-timed-out ids are silently dropped,
    /// since acks may arrive out of order and after the wait gave up.
    pub async fn resolve(&self, envelope_id: &str) {
        if let Some(tx) = self.pending.lock().await.remove(envelope_id) {
            let _ = tx.send(());
        }
    }

    /// Number of sends currently awaiting an ack.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_resolves_the_matching_wait() {
        let tracker = AckTracker::new();
        let wait = tracker.wait_for_ack("env-1", Duration::from_secs(5));
        let resolve = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracker.resolve("env-1").await;
        };
        let (result, ()) = tokio::join!(wait, resolve);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unacked_send_times_out() {
        let tracker = AckTracker::new();
        let err = tracker.wait_for_ack("env-2", Duration::from_millis(5)).await.unwrap_err();
        assert_eq!(err.0, "env-2");
    }

    #[tokio::test]
    async fn resolve_for_unknown_id_is_a_no_op() {
        let tracker = AckTracker::new();
        tracker.resolve("nobody-waiting").await;
        assert_eq!(tracker.pending_count().await, 0);
    }
}
