// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection lifecycle states.

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connect attempt is in flight.
    Connecting,
    /// Handshake complete; frames can be sent and received.
    Open,
    /// A close handshake has started.
    Closing,
    /// The connection is fully closed; a reconnecting transport may retry.
    Closed,
}

/// Why a connection closed, mirroring the WebSocket close code it used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal completion, close code 1000.
    Normal,
    /// The peer violated the send rate limit, close code 1008.
    RateLimitPolicyViolation,
    /// PONG was not received within `pong_timeout`.
    HeartbeatTimeout,
    /// Shutdown was requested while reconnecting.
    ShutdownRequested,
    /// The underlying transport failed.
    TransportError,
}

impl CloseReason {
    /// The WebSocket close code this reason maps to, where the protocol
    /// defines one.
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Normal | Self::ShutdownRequested => 1000,
            Self::RateLimitPolicyViolation => 1008,
            Self::HeartbeatTimeout | Self::TransportError => 1011,
        }
    }
}
