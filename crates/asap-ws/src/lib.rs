// SPDX-License-Identifier: MIT OR Apache-2.0
//! WebSocket transport (C10): frame loop, heartbeat, ack tracking,
//! reconnection, and per-connection send rate limiting.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ack;
mod bucket;
mod connection;
mod lifecycle;
mod transport;

pub use ack::{AckTimeout, AckTracker};
pub use bucket::SendBucket;
pub use connection::{Connection, ConnectionConfig, ConnectionError};
pub use lifecycle::{CloseReason, ConnectionState};
pub use transport::{TransportConfig, TransportError, TransportMode, WsTransport};
