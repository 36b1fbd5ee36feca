// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single live WebSocket connection: frame loop, heartbeat, and
//! per-send rate limiting. [`crate::WsTransport`] wraps this with
//! reconnect supervision.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use asap_core::Envelope;
use asap_error::{AsapError, ErrorCode};
use asap_protocol::{RpcRequest, METHOD_ACK, METHOD_SEND};

use crate::ack::{AckTimeout, AckTracker};
use crate::bucket::SendBucket;
use crate::lifecycle::{CloseReason, ConnectionState};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures from sending on, or operating, a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The initial handshake failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The local send rate limit was exceeded.
    #[error("send rate limit exceeded")]
    RateLimited,
    /// The underlying socket returned an error while sending.
    #[error("transport error: {0}")]
    Transport(String),
    /// The peer never acked the envelope in time.
    #[error(transparent)]
    AckTimeout(#[from] AckTimeout),
    /// The connection is already closing or closed.
    #[error("connection is not open")]
    NotOpen,
}

impl ConnectionError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::ConnectFailed(reason) => AsapError::new(ErrorCode::ConnectionFailed, reason),
            Self::RateLimited => AsapError::new(ErrorCode::RateLimited, "send rate limit exceeded"),
            Self::Transport(reason) => AsapError::new(ErrorCode::ConnectionFailed, reason),
            Self::AckTimeout(e) => AsapError::new(ErrorCode::ConnectionFailed, e.to_string()),
            Self::NotOpen => AsapError::new(ErrorCode::ConnectionFailed, "connection is not open"),
        }
    }
}

/// Runtime knobs for a single connection's heartbeat, ack, and rate
/// limit behavior.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Interval between outbound PING frames.
    pub heartbeat_interval: Duration,
    /// How long to wait for a PONG before treating the connection as dead.
    pub pong_timeout: Duration,
    /// How long an outbound send waits for its ack.
    pub ack_timeout: Duration,
    /// Token bucket capacity for outbound sends.
    pub send_rate_capacity: f64,
    /// Token bucket refill rate, tokens per second.
    pub send_rate_refill_per_second: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
            send_rate_capacity: 50.0,
            send_rate_refill_per_second: 10.0,
        }
    }
}

/// A single established WebSocket connection.
pub struct Connection {
    sink: Arc<Mutex<futures::stream::SplitSink<Stream, Message>>>,
    state: Arc<Mutex<ConnectionState>>,
    acks: Arc<AckTracker>,
    bucket: Arc<SendBucket>,
    inbound: broadcast::Sender<Envelope>,
    config: ConnectionConfig,
}

impl Connection {
    /// Connect to `url` and spawn the reader and heartbeat loops.
    pub async fn connect(url: &str, config: ConnectionConfig) -> Result<Self, ConnectionError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;
        let (sink, mut source) = stream.split();

        let sink = Arc::new(Mutex::new(sink));
        let state = Arc::new(Mutex::new(ConnectionState::Open));
        let acks = Arc::new(AckTracker::new());
        let bucket = Arc::new(SendBucket::new(config.send_rate_capacity, config.send_rate_refill_per_second));
        let (inbound_tx, _rx) = broadcast::channel(256);
        let pong_seen = Arc::new(tokio::sync::Notify::new());

        {
            let acks = Arc::clone(&acks);
            let inbound_tx = inbound_tx.clone();
            let state = Arc::clone(&state);
            let pong_seen = Arc::clone(&pong_seen);
            let sink_for_reader = Arc::clone(&sink);
            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            handle_text_frame(text.as_str(), &acks, &inbound_tx, &sink_for_reader).await;
                        }
                        Ok(Message::Pong(_)) => pong_seen.notify_one(),
                        Ok(Message::Ping(_)) => {}
                        Ok(Message::Close(_)) => {
                            *state.lock().await = ConnectionState::Closed;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(target: "asap.ws", error = %e, "read error, ending frame loop");
                            *state.lock().await = ConnectionState::Closed;
                            break;
                        }
                    }
                }
                *state.lock().await = ConnectionState::Closed;
            });
        }

        {
            let sink = Arc::clone(&sink);
            let state = Arc::clone(&state);
            let pong_seen = Arc::clone(&pong_seen);
            let heartbeat_interval = config.heartbeat_interval;
            let pong_timeout = config.pong_timeout;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(heartbeat_interval).await;
                    if *state.lock().await != ConnectionState::Open {
                        break;
                    }
                    if sink.lock().await.send(Message::Ping(Vec::new().into())).await.is_err() {
                        *state.lock().await = ConnectionState::Closed;
                        break;
                    }
                    let waited = tokio::time::timeout(pong_timeout, pong_seen.notified()).await;
                    if waited.is_err() {
                        warn!(target: "asap.ws", "pong timeout, closing connection");
                        let _ = sink
                            .lock()
                            .await
                            .send(close_message(CloseReason::HeartbeatTimeout))
                            .await;
                        *state.lock().await = ConnectionState::Closed;
                        break;
                    }
                }
            });
        }

        Ok(Self { sink, state, acks, bucket, inbound: inbound_tx, config })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Subscribe to inbound envelopes. Each subscriber gets its own
    /// receiver and is fanned out to concurrently; a slow subscriber
    /// never blocks delivery to others.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    /// Send `envelope`, enforcing the per-connection rate limit first,
    /// then waiting for a matching ack up to `ack_timeout`.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), ConnectionError> {
        if self.state().await != ConnectionState::Open {
            return Err(ConnectionError::NotOpen);
        }
        if !self.bucket.try_acquire().await {
            self.close(CloseReason::RateLimitPolicyViolation).await;
            return Err(ConnectionError::RateLimited);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "method": METHOD_SEND,
            "params": { "envelope": envelope },
            "id": envelope.id,
        });
        let text = serde_json::to_string(&body).map_err(|e| ConnectionError::Transport(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        self.acks.wait_for_ack(&envelope.id, self.config.ack_timeout).await?;
        Ok(())
    }

    /// Close the connection with the given reason, mapping it to the
    /// matching WebSocket close code.
    pub async fn close(&self, reason: CloseReason) {
        *self.state.lock().await = ConnectionState::Closing;
        let _ = self.sink.lock().await.send(close_message(reason)).await;
        *self.state.lock().await = ConnectionState::Closed;
    }
}

fn close_message(reason: CloseReason) -> Message {
    let code = match reason {
        CloseReason::Normal | CloseReason::ShutdownRequested => CloseCode::Normal,
        CloseReason::RateLimitPolicyViolation => CloseCode::Policy,
        CloseReason::HeartbeatTimeout | CloseReason::TransportError => CloseCode::Error,
    };
    Message::Close(Some(CloseFrame { code, reason: reason_text(reason).into() }))
}

fn reason_text(reason: CloseReason) -> &'static str {
    match reason {
        CloseReason::Normal => "normal completion",
        CloseReason::RateLimitPolicyViolation => "send rate limit exceeded",
        CloseReason::HeartbeatTimeout => "pong timeout",
        CloseReason::ShutdownRequested => "shutdown requested",
        CloseReason::TransportError => "transport error",
    }
}

async fn handle_text_frame(
    text: &str,
    acks: &Arc<AckTracker>,
    inbound_tx: &broadcast::Sender<Envelope>,
    sink: &Arc<Mutex<futures::stream::SplitSink<Stream, Message>>>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return, // malformed JSON is skipped, not fatal
    };
    let request = match RpcRequest::from_value(value) {
        Ok(r) => r,
        Err(_) => return,
    };

    match request.method.as_str() {
        METHOD_SEND => {
            if let Ok(envelope) = request.envelope() {
                let envelope_id = envelope.id.clone();
                let _ = inbound_tx.send(envelope);
                let ack = json!({
                    "jsonrpc": "2.0",
                    "method": METHOD_ACK,
                    "params": { "envelope_id": envelope_id },
                    "id": Value::Null,
                });
                if let Ok(text) = serde_json::to_string(&ack) {
                    let _ = sink.lock().await.send(Message::Text(text.into())).await;
                }
            }
        }
        METHOD_ACK => {
            if let Ok(envelope_id) = request.ack_envelope_id() {
                acks.resolve(&envelope_id).await;
            }
        }
        _ => {}
    }
}
