// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reconnect supervision over a [`Connection`]: the same backoff policy
//! as the HTTP client, with race-safe shutdown during a handshake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use asap_core::Envelope;
use asap_error::AsapError;
use asap_retry::backoff_delay;

use crate::connection::{Connection, ConnectionConfig, ConnectionError};
use crate::lifecycle::{CloseReason, ConnectionState};

/// Whether a transport reconnects automatically after losing its
/// connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    /// Reconnect with backoff until [`WsTransport::shutdown`] is called.
    Reconnecting,
    /// Do not reconnect; report the connection as closed.
    OneShot,
}

/// Configuration for a reconnecting transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Per-connection heartbeat, ack, and rate limit settings.
    pub connection: ConnectionConfig,
    /// Reconnect behavior.
    pub mode: TransportMode,
    /// Base backoff delay between reconnect attempts.
    pub base_delay: Duration,
    /// Backoff delay cap.
    pub max_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            mode: TransportMode::Reconnecting,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Failures using a transport whose connection is not currently open.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection is currently established.
    #[error("no connection is currently open")]
    NotConnected,
    /// The underlying connection rejected the send.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl TransportError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::NotConnected => {
                AsapError::new(asap_error::ErrorCode::ConnectionFailed, "no connection is currently open")
            }
            Self::Connection(e) => e.into_asap_error(),
        }
    }
}

/// A WebSocket transport that reconnects with backoff after losing its
/// connection, when configured to do so.
pub struct WsTransport {
    url: String,
    config: TransportConfig,
    current: Arc<Mutex<Option<Connection>>>,
    shutdown: Arc<AtomicBool>,
    inbound: broadcast::Sender<Envelope>,
}

impl WsTransport {
    /// Connect and start the supervising reconnect loop.
    pub async fn connect(url: impl Into<String>, config: TransportConfig) -> Result<Self, ConnectionError> {
        let url = url.into();
        let connection = Connection::connect(&url, config.connection.clone()).await?;
        let (inbound_tx, _rx) = broadcast::channel(256);
        forward_inbound(&connection, inbound_tx.clone());

        let transport = Self {
            url,
            config,
            current: Arc::new(Mutex::new(Some(connection))),
            shutdown: Arc::new(AtomicBool::new(false)),
            inbound: inbound_tx,
        };
        transport.spawn_supervisor();
        Ok(transport)
    }

    fn spawn_supervisor(&self) {
        if self.config.mode != TransportMode::Reconnecting {
            return;
        }
        let url = self.url.clone();
        let config = self.config.clone();
        let current = Arc::clone(&self.current);
        let shutdown = Arc::clone(&self.shutdown);
        let inbound = self.inbound.clone();

        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                let is_closed = {
                    let guard = current.lock().await;
                    match guard.as_ref() {
                        Some(conn) => conn.state().await == ConnectionState::Closed,
                        None => true,
                    }
                };
                if !is_closed {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                if shutdown.load(Ordering::SeqCst) {
                    debug!(target: "asap.ws", "shutdown requested, stopping reconnect supervisor");
                    return;
                }

                tokio::time::sleep(backoff_delay(attempt, config.base_delay, config.max_delay)).await;
                // Re-check after the backoff sleep: shutdown may have
                // been requested mid-wait or mid-handshake.
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                match Connection::connect(&url, config.connection.clone()).await {
                    Ok(new_connection) => {
                        if shutdown.load(Ordering::SeqCst) {
                            new_connection.close(CloseReason::ShutdownRequested).await;
                            return;
                        }
                        info!(target: "asap.ws", %url, "reconnected");
                        forward_inbound(&new_connection, inbound.clone());
                        *current.lock().await = Some(new_connection);
                        attempt = 0;
                    }
                    Err(e) => {
                        debug!(target: "asap.ws", %url, error = %e, "reconnect attempt failed");
                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        });
    }

    /// Send `envelope` over the current connection.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let guard = self.current.lock().await;
        match guard.as_ref() {
            Some(conn) => Ok(conn.send(envelope).await?),
            None => Err(TransportError::NotConnected),
        }
    }

    /// Subscribe to inbound envelopes across reconnects.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    /// Current lifecycle state of the active connection, if any.
    pub async fn state(&self) -> ConnectionState {
        match self.current.lock().await.as_ref() {
            Some(conn) => conn.state().await,
            None => ConnectionState::Closed,
        }
    }

    /// Request shutdown: stop reconnecting and close the current
    /// connection normally. Race-safe against a reconnect that is
    /// mid-handshake when shutdown is requested.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(conn) = self.current.lock().await.as_ref() {
            conn.close(CloseReason::Normal).await;
        }
    }
}

fn forward_inbound(connection: &Connection, inbound: broadcast::Sender<Envelope>) {
    let mut rx = connection.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    let _ = inbound.send(envelope);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
