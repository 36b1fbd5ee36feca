// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ASAP HTTP client: a scoped resource wrapping a pooled
//! `reqwest::Client` with retry and a per-base-URL circuit breaker.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use asap_core::Envelope;
use asap_error::{AsapError, ErrorCode};
use asap_protocol::{RpcResponse, JSONRPC_VERSION, METHOD_SEND};
use asap_retry::{backoff_delay, CircuitBreakerRegistry};

use crate::url_policy::{validate_base_url, UrlPolicyError};

/// Failures sending an envelope through the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL failed scheme/HTTPS policy.
    #[error(transparent)]
    UrlPolicy(#[from] UrlPolicyError),
    /// The circuit breaker for this base URL is open.
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    /// The remote peer returned a JSON-RPC error.
    #[error("remote error: {0:?}")]
    Remote(asap_protocol::RpcError),
    /// Transport failed after exhausting retries.
    #[error("connection failed after retries: {0}")]
    ConnectionFailed(String),
    /// Response did not parse as a JSON-RPC response.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::UrlPolicy(e) => AsapError::new(ErrorCode::ValidationFailed, e.to_string()),
            Self::CircuitOpen(url) => {
                AsapError::new(ErrorCode::CircuitOpen, "circuit breaker is open").with_context("base_url", url)
            }
            Self::Remote(e) => AsapError::new(ErrorCode::RemoteError, e.message),
            Self::ConnectionFailed(reason) => AsapError::new(ErrorCode::ConnectionFailed, reason),
            Self::MalformedResponse(reason) => AsapError::new(ErrorCode::RemoteError, reason),
        }
    }
}

/// Configuration for retry and circuit-breaking behavior.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Maximum attempts per send, including the first.
    pub max_retries: u32,
    /// Base backoff delay.
    pub base_delay: Duration,
    /// Backoff delay cap.
    pub max_delay: Duration,
    /// Consecutive failures before the breaker trips open.
    pub circuit_failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub circuit_open_duration: Duration,
    /// Allow plain HTTP against non-localhost hosts (test doubles only).
    pub allow_insecure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            circuit_failure_threshold: 5,
            circuit_open_duration: Duration::from_secs(30),
            allow_insecure: false,
        }
    }
}

/// A scoped HTTP client for sending envelopes to other agents. Holds a
/// pooled `reqwest::Client`; drop it (or call [`AsapClient::close`]) to
/// release the pool on every exit path.
pub struct AsapClient {
    http: reqwest::Client,
    config: ClientConfig,
    circuits: CircuitBreakerRegistry,
}

impl AsapClient {
    /// Build a client with the given configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            circuits: CircuitBreakerRegistry::new(config.circuit_failure_threshold, config.circuit_open_duration),
            config,
        }
    }

    /// Send `envelope` to `<base_url>/asap`, retrying retriable failures
    /// (connection errors, timeouts, and 5xx) with backoff, and honoring
    /// this base URL's circuit breaker.
    pub async fn send(&self, base_url: &str, envelope: &Envelope) -> Result<Envelope, ClientError> {
        validate_base_url(base_url, self.config.allow_insecure)?;
        if !self.circuits.allow_request(base_url) {
            return Err(ClientError::CircuitOpen(base_url.to_string()));
        }

        let body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": envelope.id.clone(),
            "method": METHOD_SEND,
            "params": { "envelope": envelope },
        });

        let mut last_error = String::new();
        for attempt in 0..self.config.max_retries {
            let result = self.http.post(format!("{base_url}/asap")).json(&body).send().await;
            match result {
                Ok(response) if response.status().is_server_error() => {
                    last_error = format!("http {}", response.status());
                }
                Ok(response) => {
                    let outcome = self.handle_response(response).await;
                    match outcome {
                        Ok(envelope) => {
                            self.circuits.on_success(base_url);
                            return Ok(envelope);
                        }
                        Err(ClientError::Remote(_)) => {
                            // A well-formed remote error is not a transport
                            // failure; don't trip the breaker or retry.
                            return outcome;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < self.config.max_retries {
                debug!(target: "asap.client", %base_url, attempt, "retrying after transport failure");
                tokio::time::sleep(backoff_delay(attempt, self.config.base_delay, self.config.max_delay)).await;
            }
        }

        self.circuits.on_failure(base_url);
        Err(ClientError::ConnectionFailed(last_error))
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Envelope, ClientError> {
        let value: serde_json::Value =
            response.json().await.map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        let rpc_response: RpcResponse =
            serde_json::from_value(value).map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        match rpc_response {
            RpcResponse::Success { result, .. } => {
                let raw = result
                    .get("envelope")
                    .cloned()
                    .ok_or_else(|| ClientError::MalformedResponse("response missing envelope".to_string()))?;
                Envelope::decode_value(raw).map_err(|e| ClientError::MalformedResponse(e.to_string()))
            }
            RpcResponse::Error { error, .. } => Err(ClientError::Remote(error)),
        }
    }

    /// Current circuit state for `base_url`, for diagnostics.
    #[must_use]
    pub fn circuit_state(&self, base_url: &str) -> asap_retry::CircuitState {
        self.circuits.state(base_url)
    }

    /// Release the underlying connection pool. `AsapClient` also releases
    /// it on drop; this exists for call sites that want an explicit exit
    /// point.
    pub fn close(self) {
        drop(self);
    }
}
