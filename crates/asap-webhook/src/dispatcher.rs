// SPDX-License-Identifier: MIT OR Apache-2.0
//! Webhook registration and delivery: SSRF-checked registration, signed
//! delivery with retry, and a bounded dead-letter queue for exhausted
//! deliveries.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use asap_error::{AsapError, ErrorCode};
use asap_retry::backoff_delay;

use crate::bucket::UrlBucketMap;
use crate::sign::{sign_body, SIGNATURE_HEADER};
use crate::ssrf::{validate_webhook_url, SsrfError};

/// Maximum number of exhausted deliveries retained in the dead-letter queue.
pub const MAX_DEAD_LETTERS: usize = 1_000;

/// A registered webhook endpoint.
#[derive(Clone, Debug)]
pub struct WebhookRegistration {
    /// Destination URL; validated against SSRF at registration time.
    pub url: String,
    /// Shared secret used to HMAC-sign delivered bodies.
    pub secret: String,
    /// Maximum delivery attempts before giving up.
    pub max_attempts: u32,
}

/// A delivery that exhausted its retry budget.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    /// The webhook URL the delivery targeted.
    pub url: String,
    /// The body that could not be delivered.
    pub body: Vec<u8>,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// Last error observed.
    pub last_error: String,
    /// Wall-clock time the delivery was abandoned, for operator display.
    pub created_at: DateTime<Utc>,
}

/// Failures from webhook registration or delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// URL failed SSRF validation.
    #[error(transparent)]
    Ssrf(#[from] SsrfError),
    /// Per-URL rate limit was exceeded.
    #[error("webhook rate limit exceeded for {0}")]
    RateLimited(String),
    /// Delivery exhausted its retry budget; the payload was dead-lettered.
    #[error("delivery to {url} exhausted after {attempts} attempts: {last_error}")]
    DeliveryExhausted {
        /// Destination URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Final error observed.
        last_error: String,
    },
}

impl WebhookError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::Ssrf(e) => AsapError::new(ErrorCode::ValidationFailed, e.to_string()),
            Self::RateLimited(url) => {
                AsapError::new(ErrorCode::RateLimited, "webhook rate limit exceeded").with_context("url", url)
            }
            Self::DeliveryExhausted { url, attempts, last_error } => {
                AsapError::new(ErrorCode::RemoteError, "webhook delivery exhausted its retry budget")
                    .with_context("url", url)
                    .with_context("attempts", attempts)
                    .with_context("last_error", last_error)
            }
        }
    }
}

/// Dispatches signed payloads to registered webhook URLs with retry,
/// SSRF guarding, per-URL rate limiting, and a bounded dead-letter queue.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    buckets: UrlBucketMap,
    base_delay: Duration,
    max_delay: Duration,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
}

impl WebhookDispatcher {
    /// Build a dispatcher around an existing HTTP client, allowing a pool
    /// to be reused across many deliveries.
    #[must_use]
    pub fn new(client: reqwest::Client, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            client,
            buckets: UrlBucketMap::new(5.0, 1.0),
            base_delay,
            max_delay,
            dead_letters: Mutex::new(VecDeque::new()),
        }
    }

    /// Validate `registration.url` against SSRF before accepting it.
    /// Performs no network I/O beyond the DNS lookup required to validate.
    pub async fn register(&self, registration: &WebhookRegistration) -> Result<(), WebhookError> {
        validate_webhook_url(&registration.url).await?;
        Ok(())
    }

    /// Deliver `body` to `registration.url`, signing it and retrying with
    /// backoff up to `registration.max_attempts`. Exhausted deliveries are
    /// pushed to the dead-letter queue and surfaced as an error.
    pub async fn deliver(&self, registration: &WebhookRegistration, body: Vec<u8>) -> Result<(), WebhookError> {
        validate_webhook_url(&registration.url).await?;
        if !self.buckets.try_acquire(&registration.url) {
            return Err(WebhookError::RateLimited(registration.url.clone()));
        }

        let signature = sign_body(registration.secret.as_bytes(), &body);
        let mut last_error = String::new();
        let mut attempts_made = 0;

        for attempt in 0..registration.max_attempts {
            attempts_made = attempt + 1;
            let result = self
                .client
                .post(&registration.url)
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) if !response.status().is_server_error() => {
                    // 4xx: non-retriable, dead-letter immediately.
                    last_error = format!("http {}", response.status());
                    break;
                }
                Ok(response) => {
                    last_error = format!("http {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < registration.max_attempts {
                tokio::time::sleep(backoff_delay(attempt, self.base_delay, self.max_delay)).await;
            }
        }

        self.dead_letter(registration, body, attempts_made, last_error.clone());
        Err(WebhookError::DeliveryExhausted {
            url: registration.url.clone(),
            attempts: attempts_made,
            last_error,
        })
    }

    fn dead_letter(&self, registration: &WebhookRegistration, body: Vec<u8>, attempts: u32, last_error: String) {
        let mut queue = self.dead_letters.lock().expect("dead letter queue lock poisoned");
        if queue.len() >= MAX_DEAD_LETTERS {
            queue.pop_front();
        }
        warn!(target: "asap.webhook", url = %registration.url, attempts, %last_error, "delivery dead-lettered");
        queue.push_back(DeadLetter {
            url: registration.url.clone(),
            body,
            attempts,
            last_error,
            created_at: Utc::now(),
        });
    }

    /// Snapshot of the current dead-letter queue, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().expect("dead letter queue lock poisoned").iter().cloned().collect()
    }
}
