// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelope and payload data model (C2).

use std::collections::BTreeMap;

use asap_error::{AsapError, ErrorCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::id::generate_id;
use crate::urn::AgentUrn;

/// Current protocol version this crate speaks, e.g. `"0.1"`.
pub const ASAP_VERSION: &str = "0.1";

/// Parse a version string of the form `"MAJOR.MINOR"`.
#[must_use]
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major_str, minor_str) = version.split_once('.')?;
    Some((major_str.parse().ok()?, minor_str.parse().ok()?))
}

/// Two versions are compatible when they share the same major component.
#[must_use]
pub fn is_compatible_version(theirs: &str, ours: &str) -> bool {
    match (parse_version(theirs), parse_version(ours)) {
        (Some((a, _)), Some((b, _))) => a == b,
        _ => false,
    }
}

/// Errors arising from envelope decoding or validation.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The body was not a well-formed envelope at all.
    #[error("malformed envelope: {0}")]
    Malformed(serde_json::Error),

    /// `payload_type` was not one of the closed registry.
    #[error("unknown payload_type {0:?}")]
    InvalidPayloadType(String),

    /// The payload failed schema validation for its declared type.
    #[error("validation failed for field {field:?}: {message}")]
    ValidationFailed {
        /// Dotted field path, when known.
        field: Option<String>,
        /// Human-readable validation message.
        message: String,
    },

    /// `asap_version` is not compatible with this runtime.
    #[error("version mismatch: peer speaks {theirs}, we speak {ours}")]
    VersionMismatch {
        /// Version presented by the peer.
        theirs: String,
        /// Version this runtime speaks.
        ours: String,
    },
}

impl EnvelopeError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::Malformed(e) => {
                AsapError::new(ErrorCode::MalformedEnvelope, "envelope is not well-formed JSON")
                    .with_source(e)
            }
            Self::InvalidPayloadType(t) => {
                AsapError::new(ErrorCode::InvalidPayloadType, format!("unknown payload_type {t:?}"))
                    .with_context("payload_type", t)
            }
            Self::ValidationFailed { field, message } => {
                let err = AsapError::new(ErrorCode::ValidationFailed, message);
                match field {
                    Some(f) => err.with_context("field", f),
                    None => err,
                }
            }
            Self::VersionMismatch { theirs, ours } => {
                AsapError::new(ErrorCode::VersionMismatch, "incompatible asap_version")
                    .with_context("theirs", theirs)
                    .with_context("ours", ours)
            }
        }
    }
}

/// `task.request` payload: ask a recipient to execute a declared skill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRequestPayload {
    /// Skill identifier declared in the recipient's manifest.
    pub skill_id: String,
    /// Structured input matching the skill's input schema.
    pub input: Value,
    /// Optional client-supplied key for `POST /asap` deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// `task.response` payload: the outcome of a previously requested task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskResponsePayload {
    /// Task status at the time this response was produced.
    pub status: String,
    /// Result value, present when `status` is `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Structured error, present when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// `task.update` payload: a progress notification for a running task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdatePayload {
    /// Task being updated.
    pub task_id: String,
    /// Fractional progress in `[0.0, 1.0]`, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Human-readable progress message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `task.cancel` payload: request cancellation of a running task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskCancelPayload {
    /// Task to cancel.
    pub task_id: String,
    /// Reason for cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `message.send` payload: an unstructured inter-agent message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSendPayload {
    /// Message body, opaque to the transport.
    pub body: Value,
}

/// `state.query` payload: ask for a task's current snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateQueryPayload {
    /// Task whose state is being queried.
    pub task_id: String,
    /// Specific version to fetch; latest if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// `state.restore` payload: resume a task from a previously saved snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateRestorePayload {
    /// Task being restored.
    pub task_id: String,
    /// Version to resume from; latest if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<u64>,
}

/// `artifact.notify` payload: announce an artifact produced by a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactNotifyPayload {
    /// Task that produced the artifact.
    pub task_id: String,
    /// Artifact identifier, unique within the task.
    pub artifact_id: String,
    /// Location the artifact can be fetched from.
    pub uri: String,
    /// MIME type of the artifact, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// `mcp.tool_call` payload: invoke a Model Context Protocol tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpToolCallPayload {
    /// Tool name as declared by the recipient.
    pub tool_name: String,
    /// Arguments matching the tool's input schema.
    #[serde(default)]
    pub arguments: Value,
}

/// `mcp.tool_result` payload: the result of an MCP tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpToolResultPayload {
    /// Tool that produced this result.
    pub tool_name: String,
    /// Result content.
    #[serde(default)]
    pub content: Value,
    /// Whether the tool invocation itself failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Typed payload, discriminated on the wire by the sibling
/// `payload_type`/`payload` fields. Unknown `payload_type` values and
/// unknown fields within a known payload both fail validation; see
/// [`Envelope::decode`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload_type", content = "payload")]
pub enum Payload {
    /// See [`TaskRequestPayload`].
    #[serde(rename = "task.request")]
    TaskRequest(TaskRequestPayload),
    /// See [`TaskResponsePayload`].
    #[serde(rename = "task.response")]
    TaskResponse(TaskResponsePayload),
    /// See [`TaskUpdatePayload`].
    #[serde(rename = "task.update")]
    TaskUpdate(TaskUpdatePayload),
    /// See [`TaskCancelPayload`].
    #[serde(rename = "task.cancel")]
    TaskCancel(TaskCancelPayload),
    /// See [`MessageSendPayload`].
    #[serde(rename = "message.send")]
    MessageSend(MessageSendPayload),
    /// See [`StateQueryPayload`].
    #[serde(rename = "state.query")]
    StateQuery(StateQueryPayload),
    /// See [`StateRestorePayload`].
    #[serde(rename = "state.restore")]
    StateRestore(StateRestorePayload),
    /// See [`ArtifactNotifyPayload`].
    #[serde(rename = "artifact.notify")]
    ArtifactNotify(ArtifactNotifyPayload),
    /// See [`McpToolCallPayload`].
    #[serde(rename = "mcp.tool_call")]
    McpToolCall(McpToolCallPayload),
    /// See [`McpToolResultPayload`].
    #[serde(rename = "mcp.tool_result")]
    McpToolResult(McpToolResultPayload),
}

impl Payload {
    /// The wire discriminator string, e.g. `"task.request"`.
    #[must_use]
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::TaskRequest(_) => "task.request",
            Self::TaskResponse(_) => "task.response",
            Self::TaskUpdate(_) => "task.update",
            Self::TaskCancel(_) => "task.cancel",
            Self::MessageSend(_) => "message.send",
            Self::StateQuery(_) => "state.query",
            Self::StateRestore(_) => "state.restore",
            Self::ArtifactNotify(_) => "artifact.notify",
            Self::McpToolCall(_) => "mcp.tool_call",
            Self::McpToolResult(_) => "mcp.tool_result",
        }
    }

    /// All payload_type strings in the closed registry.
    #[must_use]
    pub fn known_types() -> &'static [&'static str] {
        &[
            "task.request",
            "task.response",
            "task.update",
            "task.cancel",
            "message.send",
            "state.query",
            "state.restore",
            "artifact.notify",
            "mcp.tool_call",
            "mcp.tool_result",
        ]
    }
}

/// Immutable message unit carrying one typed payload.
///
/// Envelopes are never mutated after construction; any transformation
/// (e.g. building a response) produces a new value via [`Envelope::reply`]
/// or a fresh [`EnvelopeBuilder`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version tag, e.g. `"0.1"`.
    pub asap_version: String,
    /// Unique lexicographic identifier (C1).
    pub id: String,
    /// Links a response to the request that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Workflow-wide identifier for cross-agent log correlation.
    pub trace_id: String,
    /// Creation time in UTC, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// Sending agent.
    pub sender: AgentUrn,
    /// Receiving agent.
    pub recipient: AgentUrn,
    /// Typed payload; flattened so `payload_type`/`payload` sit at the
    /// top level of the envelope on the wire.
    #[serde(flatten)]
    pub payload: Payload,
    /// Namespaced, unvalidated extension map.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl Envelope {
    /// Decode an envelope from JSON bytes, producing codes that match the
    /// §7 taxonomy: malformed JSON, an unrecognized `payload_type`, or a
    /// schema mismatch within a known payload all get distinct
    /// [`EnvelopeError`] variants instead of one generic parse failure.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)?;
        Self::decode_value(value)
    }

    /// As [`Envelope::decode`], but starting from an already-parsed
    /// [`serde_json::Value`] (used by the WebSocket transport, which
    /// receives whole JSON frames rather than byte slices).
    pub fn decode_value(value: Value) -> Result<Self, EnvelopeError> {
        let payload_type = value
            .get("payload_type")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvelopeError::ValidationFailed {
                field: Some("payload_type".to_string()),
                message: "payload_type is required and must be a string".to_string(),
            })?;
        if !Payload::known_types().contains(&payload_type) {
            return Err(EnvelopeError::InvalidPayloadType(payload_type.to_string()));
        }
        serde_json::from_value(value).map_err(|e| EnvelopeError::ValidationFailed {
            field: None,
            message: e.to_string(),
        })
    }

    /// Serialize this envelope to a JSON byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Build a response envelope addressed back to `self.sender`, stamped
    /// with a fresh id and `correlation_id = self.id`.
    #[must_use]
    pub fn reply(&self, from: AgentUrn, payload: Payload) -> Self {
        Self {
            asap_version: ASAP_VERSION.to_string(),
            id: generate_id(),
            correlation_id: Some(self.id.clone()),
            trace_id: self.trace_id.clone(),
            timestamp: Utc::now(),
            sender: from,
            recipient: self.sender.clone(),
            payload,
            extensions: BTreeMap::new(),
        }
    }
}

/// Fluent constructor for a fresh (non-reply) [`Envelope`].
#[derive(Debug)]
pub struct EnvelopeBuilder {
    sender: AgentUrn,
    recipient: AgentUrn,
    payload: Payload,
    correlation_id: Option<String>,
    trace_id: Option<String>,
    extensions: BTreeMap<String, Value>,
}

impl EnvelopeBuilder {
    /// Start building an envelope from `sender` to `recipient` carrying
    /// `payload`.
    #[must_use]
    pub fn new(sender: AgentUrn, recipient: AgentUrn, payload: Payload) -> Self {
        Self {
            sender,
            recipient,
            payload,
            correlation_id: None,
            trace_id: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Set the correlation id (usually the request envelope's `id`).
    #[must_use]
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set an explicit trace id; a fresh one is generated if never called.
    #[must_use]
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    /// Attach an extension field.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.extensions.insert(key.into(), v);
        }
        self
    }

    /// Finalize the envelope, stamping a fresh id and the current time.
    #[must_use]
    pub fn build(self) -> Envelope {
        Envelope {
            asap_version: ASAP_VERSION.to_string(),
            id: generate_id(),
            correlation_id: self.correlation_id,
            trace_id: self.trace_id.unwrap_or_else(generate_id),
            timestamp: Utc::now(),
            sender: self.sender,
            recipient: self.recipient,
            payload: self.payload,
            extensions: self.extensions,
        }
    }
}
