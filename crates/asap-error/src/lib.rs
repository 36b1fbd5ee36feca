// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for the ASAP protocol runtime.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level grouping of an [`ErrorCode`], matching the `asap:<category>/…`
/// wire prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Envelope shape, framing, or replay-guard failures.
    Protocol,
    /// Agent lookup and conversation routing failures.
    Routing,
    /// Skill/tool invocation failures.
    Capability,
    /// Task execution and state-machine failures.
    Execution,
    /// Quota, rate limit, and storage capacity failures.
    Resource,
    /// Authentication and identity-binding failures.
    Security,
    /// Outbound client (HTTP/WebSocket) failures.
    Client,
    /// Anything that does not map to a documented code.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Protocol => "protocol",
            Self::Routing => "routing",
            Self::Capability => "capability",
            Self::Execution => "execution",
            Self::Resource => "resource",
            Self::Security => "security",
            Self::Client => "client",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable ASAP error code, one per row of the §7 taxonomy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // -- protocol --------------------------------------------------------
    /// Body did not parse as a well-formed envelope.
    MalformedEnvelope,
    /// `payload_type` is not in the closed registry.
    InvalidPayloadType,
    /// Payload failed schema validation for its declared type.
    ValidationFailed,
    /// Envelope timestamp fell outside the acceptance window.
    InvalidTimestamp,
    /// Nonce was already recorded as used.
    NonceReuse,
    /// `asap_version` is not compatible with this server.
    VersionMismatch,
    // -- routing -----------------------------------------------------------
    /// `recipient` does not name a known agent.
    AgentNotFound,
    /// `recipient` is known but currently unreachable.
    AgentUnreachable,
    /// `conversation_id` no longer has an active conversation.
    ConversationExpired,
    // -- capability --------------------------------------------------------
    /// `skill_id` is not declared by the recipient's manifest.
    SkillNotFound,
    /// Skill is declared but temporarily unavailable.
    SkillUnavailable,
    /// Skill input failed its declared input schema.
    InputValidation,
    // -- execution -----------------------------------------------------------
    /// Task handler raised a domain failure.
    TaskFailed,
    /// Task exceeded its execution deadline.
    TaskTimeout,
    /// Task was cancelled before completion.
    TaskCancelled,
    /// Requested status transition is not in the valid-transition table.
    InvalidTransition,
    // -- resource -----------------------------------------------------------
    /// Sender exceeded a configured quota.
    QuotaExceeded,
    /// Sender exceeded the rate limiter.
    RateLimited,
    /// A store rejected a write because it is full.
    StorageFull,
    // -- security -----------------------------------------------------------
    /// Endpoint requires authentication and none was presented.
    AuthRequired,
    /// Presented credentials failed verification.
    AuthInvalid,
    /// Credentials verified but lack the required scope.
    PermissionDenied,
    /// Authenticated identity does not match `envelope.sender`.
    IdentityMismatch,
    // -- client -----------------------------------------------------------
    /// Circuit breaker is open for the target base URL.
    CircuitOpen,
    /// Underlying transport failed to connect.
    ConnectionFailed,
    /// Remote peer returned an error response.
    RemoteError,
    // -- internal -----------------------------------------------------------
    /// Unclassified server-side failure; never leaks internals unless
    /// debug mode is enabled.
    InternalError,
}

/// Every variant, for exhaustiveness tests and documentation generation.
pub const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::MalformedEnvelope,
    ErrorCode::InvalidPayloadType,
    ErrorCode::ValidationFailed,
    ErrorCode::InvalidTimestamp,
    ErrorCode::NonceReuse,
    ErrorCode::VersionMismatch,
    ErrorCode::AgentNotFound,
    ErrorCode::AgentUnreachable,
    ErrorCode::ConversationExpired,
    ErrorCode::SkillNotFound,
    ErrorCode::SkillUnavailable,
    ErrorCode::InputValidation,
    ErrorCode::TaskFailed,
    ErrorCode::TaskTimeout,
    ErrorCode::TaskCancelled,
    ErrorCode::InvalidTransition,
    ErrorCode::QuotaExceeded,
    ErrorCode::RateLimited,
    ErrorCode::StorageFull,
    ErrorCode::AuthRequired,
    ErrorCode::AuthInvalid,
    ErrorCode::PermissionDenied,
    ErrorCode::IdentityMismatch,
    ErrorCode::CircuitOpen,
    ErrorCode::ConnectionFailed,
    ErrorCode::RemoteError,
    ErrorCode::InternalError,
];

impl ErrorCode {
    /// The category this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::MalformedEnvelope
            | Self::InvalidPayloadType
            | Self::ValidationFailed
            | Self::InvalidTimestamp
            | Self::NonceReuse
            | Self::VersionMismatch => ErrorCategory::Protocol,
            Self::AgentNotFound | Self::AgentUnreachable | Self::ConversationExpired => {
                ErrorCategory::Routing
            }
            Self::SkillNotFound | Self::SkillUnavailable | Self::InputValidation => {
                ErrorCategory::Capability
            }
            Self::TaskFailed | Self::TaskTimeout | Self::TaskCancelled | Self::InvalidTransition => {
                ErrorCategory::Execution
            }
            Self::QuotaExceeded | Self::RateLimited | Self::StorageFull => ErrorCategory::Resource,
            Self::AuthRequired
            | Self::AuthInvalid
            | Self::PermissionDenied
            | Self::IdentityMismatch => ErrorCategory::Security,
            Self::CircuitOpen | Self::ConnectionFailed | Self::RemoteError => ErrorCategory::Client,
            Self::InternalError => ErrorCategory::Internal,
        }
    }

    /// Short snake_case name, without the category prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedEnvelope => "malformed_envelope",
            Self::InvalidPayloadType => "invalid_payload_type",
            Self::ValidationFailed => "validation_failed",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::NonceReuse => "nonce_reuse",
            Self::VersionMismatch => "version_mismatch",
            Self::AgentNotFound => "agent_not_found",
            Self::AgentUnreachable => "agent_unreachable",
            Self::ConversationExpired => "conversation_expired",
            Self::SkillNotFound => "skill_not_found",
            Self::SkillUnavailable => "skill_unavailable",
            Self::InputValidation => "input_validation",
            Self::TaskFailed => "task_failed",
            Self::TaskTimeout => "task_timeout",
            Self::TaskCancelled => "task_cancelled",
            Self::InvalidTransition => "invalid_transition",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::StorageFull => "storage_full",
            Self::AuthRequired => "auth_required",
            Self::AuthInvalid => "auth_invalid",
            Self::PermissionDenied => "permission_denied",
            Self::IdentityMismatch => "identity_mismatch",
            Self::CircuitOpen => "circuit_open",
            Self::ConnectionFailed => "connection_failed",
            Self::RemoteError => "remote_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Full wire form, e.g. `asap:security/identity_mismatch`.
    #[must_use]
    pub fn wire_code(self) -> String {
        format!("asap:{}/{}", self.category(), self.as_str())
    }

    /// Whether a caller may retry after receiving this code, per §7.
    ///
    /// `rate_limited` and `agent_unreachable` and `task_timeout` are
    /// retryable only under the conditions documented in §7 (after
    /// `Retry-After`, or by the caller's own policy); this returns the
    /// coarse yes/no from the taxonomy table.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(
            self,
            Self::AgentUnreachable
                | Self::SkillUnavailable
                | Self::TaskTimeout
                | Self::RateLimited
                | Self::ConnectionFailed
                | Self::RemoteError
        )
    }

    /// The HTTP status this code maps to on `POST /asap`.
    ///
    /// Per §6, most refusals ride a `200` with a JSON-RPC error body;
    /// only auth, identity, payload-size, and rate-limit refusals get a
    /// distinct HTTP status.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::AuthRequired | Self::AuthInvalid => 401,
            Self::IdentityMismatch | Self::PermissionDenied => 403,
            Self::RateLimited => 429,
            _ => 200,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_code())
    }
}

/// A fully-formed ASAP error: machine code, human message, structured
/// context, and an optional opaque source for server-side logging.
pub struct AsapError {
    code: ErrorCode,
    message: String,
    context: BTreeMap<String, Value>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AsapError {
    /// Construct a new error with the given code and human message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Attach a structured context field. Silently dropped if `value`
    /// cannot be serialized.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach the underlying error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The machine code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Shorthand for `self.code().category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured context attached to this error.
    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// Render the value that belongs at JSON-RPC `data.asap_error`.
    ///
    /// `debug` controls whether the source error's `Display` is included;
    /// it must only be `true` when `ASAP_DEBUG` is set, per §7.
    #[must_use]
    pub fn to_dto(&self, debug: bool) -> AsapErrorDto {
        AsapErrorDto {
            code: self.code.wire_code(),
            message: self.message.clone(),
            context: self.context.clone(),
            source_message: if debug {
                self.source.as_ref().map(|s| s.to_string())
            } else {
                None
            },
        }
    }
}

impl fmt::Debug for AsapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsapError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for AsapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code.wire_code(), self.message)
        } else {
            let ctx = serde_json::to_string(&self.context).unwrap_or_default();
            write!(f, "[{}] {} {ctx}", self.code.wire_code(), self.message)
        }
    }
}

impl std::error::Error for AsapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Serializable view of an [`AsapError`], suitable for `data.asap_error`.
///
/// Loses the opaque `source`; `source_message` captures its `Display`
/// form when the caller opted into debug output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AsapErrorDto {
    /// Wire-form code, e.g. `asap:protocol/invalid_timestamp`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured, non-secret context fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, Value>,
    /// Debug-only rendering of the source error, if `ASAP_DEBUG` is set.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_codes_present_and_unique() {
        assert_eq!(ALL_CODES.len(), 27);
        let mut sorted = ALL_CODES.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ALL_CODES.len());
    }

    #[test]
    fn wire_code_matches_spec_shape() {
        assert_eq!(
            ErrorCode::IdentityMismatch.wire_code(),
            "asap:security/identity_mismatch"
        );
        assert_eq!(
            ErrorCode::InvalidTimestamp.wire_code(),
            "asap:protocol/invalid_timestamp"
        );
        assert_eq!(
            ErrorCode::NonceReuse.wire_code(),
            "asap:protocol/nonce_reuse"
        );
    }

    #[test]
    fn http_status_matches_external_interface_table() {
        assert_eq!(ErrorCode::AuthRequired.http_status(), 401);
        assert_eq!(ErrorCode::IdentityMismatch.http_status(), 403);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::ValidationFailed.http_status(), 200);
    }

    #[test]
    fn retryable_matches_taxonomy_table() {
        assert!(ErrorCode::RateLimited.retryable());
        assert!(ErrorCode::TaskTimeout.retryable());
        assert!(!ErrorCode::InvalidTransition.retryable());
        assert!(!ErrorCode::IdentityMismatch.retryable());
        assert!(!ErrorCode::CircuitOpen.retryable());
    }

    #[test]
    fn context_builder_and_dto_roundtrip() {
        let err = AsapError::new(ErrorCode::ValidationFailed, "bad field")
            .with_context("field", "payload.skill_id");
        let dto = err.to_dto(false);
        assert_eq!(dto.code, "asap:protocol/validation_failed");
        assert!(dto.source_message.is_none());
        assert_eq!(
            dto.context.get("field").and_then(|v| v.as_str()),
            Some("payload.skill_id")
        );

        let json = serde_json::to_string(&dto).unwrap();
        let back: AsapErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);
    }

    #[test]
    fn debug_flag_controls_source_leakage() {
        let source = std::io::Error::other("boom");
        let err = AsapError::new(ErrorCode::InternalError, "unexpected failure")
            .with_source(source);
        assert!(err.to_dto(false).source_message.is_none());
        assert_eq!(err.to_dto(true).source_message.as_deref(), Some("boom"));
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = AsapError::new(ErrorCode::AgentNotFound, "no such agent");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[asap:routing/agent_not_found]"));
        assert!(rendered.contains("no such agent"));
    }
}
