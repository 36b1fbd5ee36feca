// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable data model shared by every ASAP component: sortable identifiers
//! and clock helpers (C1), the [`Envelope`]/[`Payload`] wire model (C2),
//! and [`AgentUrn`] agent identities.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod id;
pub mod urn;

pub use envelope::{
    is_compatible_version, parse_version, ArtifactNotifyPayload, Envelope, EnvelopeBuilder,
    EnvelopeError, McpToolCallPayload, McpToolResultPayload, MessageSendPayload, Payload,
    StateQueryPayload, StateRestorePayload, TaskCancelPayload, TaskRequestPayload,
    TaskResponsePayload, TaskUpdatePayload, ASAP_VERSION,
};
pub use id::{extract_timestamp, generate_id};
pub use urn::{AgentUrn, AgentUrnError};
