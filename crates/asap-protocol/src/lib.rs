// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC 2.0 framing (C4) wrapping [`asap_core::Envelope`] exchanges.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use asap_core::Envelope;
use asap_error::AsapError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// The only JSON-RPC version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request method used to exchange an envelope over `POST /asap` or a
/// WebSocket frame.
pub const METHOD_SEND: &str = "asap.send";

/// Request method used to acknowledge receipt of a WebSocket frame.
pub const METHOD_ACK: &str = "asap.ack";

/// A JSON-RPC request id: a number, a string, or absent (`null`), per the
/// 2.0 spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
    /// No id was supplied (notification-shaped call).
    Null,
}

/// Standard JSON-RPC 2.0 error codes, plus their ASAP framing rules.
#[derive(Debug, Error)]
pub enum RpcErrorCode {
    /// `-32700`: the body was not well-formed JSON.
    #[error("parse error")]
    ParseError,
    /// `-32600`: the body was valid JSON but not a JSON-RPC request object.
    #[error("invalid request")]
    InvalidRequest,
    /// `-32601`: `method` is not one this server understands.
    #[error("method not found")]
    MethodNotFound,
    /// `-32602`: `params` was missing or malformed for the given method.
    #[error("invalid params")]
    InvalidParams,
    /// `-32603`: an unexpected failure inside the server pipeline.
    #[error("internal error")]
    InternalError,
}

impl RpcErrorCode {
    /// The numeric JSON-RPC code.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// The `error` member of a JSON-RPC error response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric JSON-RPC code.
    pub code: i64,
    /// Short human-readable summary.
    pub message: String,
    /// Structured detail; carries `asap_error` when the failure originated
    /// in the ASAP error taxonomy rather than the JSON-RPC framing itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(kind: RpcErrorCode, message: impl Into<String>) -> Self {
        Self { code: kind.code(), message: message.into(), data: None }
    }

    /// `-32700 parse error`.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(RpcErrorCode::ParseError, "invalid JSON")
    }

    /// `-32600 invalid request`: body was not a JSON-RPC request object.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, reason)
    }

    /// `-32601 method not found`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, format!("unknown method {method:?}"))
    }

    /// `-32602 invalid params`: `params` was missing or the wrong shape.
    #[must_use]
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, reason)
    }

    /// `-32603 internal error`, with no leaked detail.
    #[must_use]
    pub fn internal_error() -> Self {
        Self::new(RpcErrorCode::InternalError, "internal error")
    }

    /// Build an error response carrying `data.asap_error`, the bridge from
    /// the ASAP error taxonomy (§7) into JSON-RPC framing. Uses
    /// `-32602` for client-caused categories and `-32603` otherwise, since
    /// JSON-RPC itself has no richer vocabulary; the real detail rides in
    /// `data.asap_error`.
    #[must_use]
    pub fn from_asap_error(err: &AsapError) -> Self {
        let kind = match err.category() {
            asap_error::ErrorCategory::Protocol | asap_error::ErrorCategory::Client => {
                RpcErrorCode::InvalidParams
            }
            _ => RpcErrorCode::InternalError,
        };
        Self {
            code: kind.code(),
            message: err.message().to_string(),
            data: Some(json!({ "asap_error": err.to_dto(false) })),
        }
    }

    /// Wrap into a complete [`RpcResponse`].
    #[must_use]
    pub fn into_response(self, id: RpcId) -> RpcResponse {
        RpcResponse::Error { jsonrpc: JSONRPC_VERSION.to_string(), id, error: self }
    }
}

/// A decoded, shape-validated JSON-RPC request.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcRequest {
    /// `method` member, e.g. `"asap.send"`.
    pub method: String,
    /// `params` member; always an object, defaulted to `{}` if absent.
    pub params: Value,
    /// `id` member; `RpcId::Null` for notification-shaped calls.
    pub id: RpcId,
}

impl RpcRequest {
    /// Parse and shape-validate a JSON-RPC request from raw bytes.
    ///
    /// Distinguishes parse failures (`-32700`) from shape failures
    /// (`-32600`/`-32602`) per §4.4: a non-object body is `-32600`, a
    /// present-but-non-object `params` is `-32602`.
    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|_| RpcError::parse_error())?;
        Self::from_value(value)
    }

    /// As [`RpcRequest::decode`], starting from an already-parsed value
    /// (used by the WebSocket transport).
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Value::Object(map) = value else {
            return Err(RpcError::invalid_request("request body must be a JSON object"));
        };
        let id = match map.get("id") {
            None | Some(Value::Null) => RpcId::Null,
            Some(Value::Number(n)) => RpcId::Number(n.as_i64().unwrap_or_default()),
            Some(Value::String(s)) => RpcId::String(s.clone()),
            Some(_) => return Err(RpcError::invalid_request("id must be a string, number, or null")),
        };
        let method = match map.get("method") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(RpcError::invalid_request("method is required and must be a string")),
        };
        let params = match map.get("params") {
            None => json!({}),
            Some(Value::Object(p)) => Value::Object(p.clone()),
            Some(_) => return Err(RpcError::invalid_params("params must be an object")),
        };
        Ok(Self { method, params, id })
    }

    /// Decode `params.envelope` for an `asap.send` request.
    pub fn envelope(&self) -> Result<Envelope, RpcError> {
        let raw = self
            .params
            .get("envelope")
            .cloned()
            .ok_or_else(|| RpcError::invalid_params("params.envelope is required"))?;
        Envelope::decode_value(raw)
            .map_err(|e| RpcError::from_asap_error(&e.into_asap_error()))
    }

    /// Decode `params.envelope_id` for an `asap.ack` request.
    pub fn ack_envelope_id(&self) -> Result<String, RpcError> {
        self.params
            .get("envelope_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::invalid_params("params.envelope_id is required"))
    }

    /// `Err(RpcError::method_not_found)` unless `method` is one of the
    /// methods this crate knows how to frame.
    pub fn require_known_method(&self) -> Result<(), RpcError> {
        match self.method.as_str() {
            METHOD_SEND | METHOD_ACK => Ok(()),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// A complete JSON-RPC response: success or error, tagged by presence of
/// `result` vs `error` rather than an explicit discriminator field, per
/// the wire spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    /// `{jsonrpc, id, result}`.
    Success {
        /// Always `"2.0"`.
        jsonrpc: String,
        /// Echoes the request id.
        id: RpcId,
        /// The handler's result, usually `{envelope: ...}`.
        result: Value,
    },
    /// `{jsonrpc, id, error}`.
    Error {
        /// Always `"2.0"`.
        jsonrpc: String,
        /// Echoes the request id.
        id: RpcId,
        /// Structured failure detail.
        error: RpcError,
    },
}

impl RpcResponse {
    /// Build a success response wrapping a response envelope.
    #[must_use]
    pub fn success_envelope(id: RpcId, envelope: &Envelope) -> Self {
        Self::Success {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: json!({ "envelope": envelope }),
        }
    }

    /// Build a bare success response, e.g. for `asap.ack`.
    #[must_use]
    pub fn success(id: RpcId, result: Value) -> Self {
        Self::Success { jsonrpc: JSONRPC_VERSION.to_string(), id, result }
    }

    /// Serialize to a JSON byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_object_body_is_invalid_request() {
        let err = RpcRequest::from_value(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn non_object_params_is_invalid_params() {
        let value = json!({"jsonrpc": "2.0", "method": "asap.send", "params": "bogus", "id": 1});
        let err = RpcRequest::from_value(value).unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn missing_method_is_invalid_request() {
        let value = json!({"jsonrpc": "2.0", "params": {}, "id": 1});
        let err = RpcRequest::from_value(value).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let value = json!({"jsonrpc": "2.0", "method": "asap.teleport", "params": {}, "id": 1});
        let request = RpcRequest::from_value(value).unwrap();
        let err = request.require_known_method().unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn missing_params_defaults_to_empty_object() {
        let value = json!({"jsonrpc": "2.0", "method": "asap.ack", "id": 1});
        let request = RpcRequest::from_value(value).unwrap();
        assert_eq!(request.params, json!({}));
    }

    #[test]
    fn ack_request_extracts_envelope_id() {
        let value = json!({
            "jsonrpc": "2.0",
            "method": "asap.ack",
            "params": {"envelope_id": "01ARZ3"},
            "id": "req-1",
        });
        let request = RpcRequest::from_value(value).unwrap();
        assert_eq!(request.ack_envelope_id().unwrap(), "01ARZ3");
        assert_eq!(request.id, RpcId::String("req-1".to_string()));
    }

    #[test]
    fn success_response_wraps_envelope_under_result() {
        let sender = asap_core::AgentUrn::new("acme", "a").unwrap();
        let recipient = asap_core::AgentUrn::new("acme", "b").unwrap();
        let envelope = asap_core::EnvelopeBuilder::new(
            sender,
            recipient,
            asap_core::Payload::MessageSend(asap_core::MessageSendPayload { body: json!("hi") }),
        )
        .build();
        let response = RpcResponse::success_envelope(RpcId::Number(1), &envelope);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert!(value["result"]["envelope"].is_object());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn asap_error_bridges_into_data_field() {
        let err = AsapError::new(asap_error::ErrorCode::ValidationFailed, "bad input");
        let rpc_err = RpcError::from_asap_error(&err);
        assert_eq!(rpc_err.code, -32602);
        assert_eq!(
            rpc_err.data.unwrap()["asap_error"]["code"],
            "asap:protocol/validation_failed"
        );
    }

    #[test]
    fn error_response_wire_shape_matches_snapshot() {
        let err = AsapError::new(asap_error::ErrorCode::InvalidTimestamp, "envelope timestamp outside acceptance window")
            .with_context("retry_after_seconds", 0u64);
        let response = RpcError::from_asap_error(&err).into_response(RpcId::String("req-1".to_string()));
        insta::assert_json_snapshot!(response);
    }

    #[test]
    fn method_not_found_response_wire_shape_matches_snapshot() {
        let response = RpcError::method_not_found("asap.teleport").into_response(RpcId::Number(7));
        insta::assert_json_snapshot!(response);
    }
}
