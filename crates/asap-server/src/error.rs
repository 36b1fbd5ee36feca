//! Bridges [`AsapError`] into an HTTP response: JSON-RPC error body plus
//! the outer status code table from the external interfaces section
//! (401/403/413/429 for auth, identity, payload-size, and rate-limit
//! refusals; 200 with a JSON-RPC error body for everything else).

use asap_error::{AsapError, ErrorCategory};
use asap_protocol::{RpcError, RpcErrorCode, RpcId};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A failed request, carrying enough to render both the outer HTTP
/// envelope and the inner JSON-RPC error.
pub struct ApiError {
    id: RpcId,
    error: AsapError,
    debug: bool,
    status_override: Option<StatusCode>,
}

impl ApiError {
    /// Build from a taxonomy error, the request id it responds to, and
    /// whether debug-mode source detail may be included.
    #[must_use]
    pub fn new(id: RpcId, error: AsapError, debug: bool) -> Self {
        Self { id, error, debug, status_override: None }
    }

    /// Override the HTTP status the taxonomy code would otherwise produce.
    /// Needed for failures whose status depends on which side erred
    /// (e.g. a JWKS endpoint outage is `503`, not the `401` its code
    /// maps to by default) rather than on the taxonomy code alone.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    /// The underlying ASAP error code.
    #[must_use]
    pub fn code(&self) -> asap_error::ErrorCode {
        self.error.code()
    }
}

/// Same mapping as [`RpcError::from_asap_error`], but honoring the
/// caller's debug flag rather than always suppressing source detail.
fn rpc_error(err: &AsapError, debug: bool) -> RpcError {
    let kind = match err.category() {
        ErrorCategory::Protocol | ErrorCategory::Client => RpcErrorCode::InvalidParams,
        _ => RpcErrorCode::InternalError,
    };
    let mut error = RpcError::invalid_params(err.message());
    error.code = kind.code();
    error.data = Some(json!({ "asap_error": err.to_dto(debug) }));
    error
}

/// Build the JSON-RPC error response for a taxonomy error, shared between
/// the HTTP and WebSocket transports (the latter has no HTTP status to
/// carry, only the response body and, separately, a close code).
#[must_use]
pub fn asap_error_to_rpc_response(id: asap_protocol::RpcId, err: &AsapError, debug: bool) -> asap_protocol::RpcResponse {
    rpc_error(err, debug).into_response(id)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self
            .status_override
            .unwrap_or_else(|| StatusCode::from_u16(self.error.code().http_status()).unwrap_or(StatusCode::OK));
        let retry_after = self
            .error
            .context()
            .get("retry_after_seconds")
            .and_then(|v| v.as_u64());

        let response = rpc_error(&self.error, self.debug).into_response(self.id);
        let mut http_response = (status, Json(response)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                http_response.headers_mut().insert("Retry-After", value);
            }
        }
        http_response
    }
}
