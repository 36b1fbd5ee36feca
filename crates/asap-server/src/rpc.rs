//! The `POST /asap` handler: JSON-RPC framing around the shared
//! envelope pipeline. Body-size enforcement happens here, before any
//! JSON-RPC or envelope decoding, since the taxonomy has no error code
//! for payload-too-large (it rides a transport-level `413`, not a JSON-RPC
//! error body).

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use asap_protocol::{RpcId, RpcRequest, RpcResponse, METHOD_ACK, METHOD_SEND};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use flate2::read::GzDecoder;
use serde_json::json;

use crate::error::ApiError;
use crate::pipeline::process_envelope;
use crate::state::AppState;

/// `POST /asap`: decode, run the pipeline, and re-encode the reply.
pub async fn post_asap(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() as u64 > state.config.max_request_size_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let decoded = match decompress_body(&headers, &body) {
        Ok(bytes) => bytes,
        Err(status) => return status.into_response(),
    };

    let client_addr = addr.to_string();
    let bearer = bearer_token(&headers);

    let request = match RpcRequest::decode(&decoded) {
        Ok(r) => r,
        Err(err) => return (StatusCode::OK, Json(err.into_response(RpcId::Null))).into_response(),
    };
    if let Err(err) = request.require_known_method() {
        return (StatusCode::OK, Json(err.into_response(request.id))).into_response();
    }

    match request.method.as_str() {
        METHOD_SEND => handle_send(&state, request, &client_addr, bearer.as_deref()).await,
        METHOD_ACK => handle_ack(request),
        _ => unreachable!("require_known_method already rejected anything else"),
    }
}

/// Decode `params.envelope`, run it through the pipeline, and wrap the
/// reply envelope in a JSON-RPC success response.
async fn handle_send(state: &Arc<AppState>, request: RpcRequest, client_addr: &str, bearer: Option<&str>) -> Response {
    let envelope = match request.envelope() {
        Ok(e) => e,
        Err(err) => return (StatusCode::OK, Json(err.into_response(request.id))).into_response(),
    };

    match process_envelope(state, envelope, client_addr, bearer).await {
        Ok(reply) => (StatusCode::OK, Json(RpcResponse::success_envelope(request.id, &reply))).into_response(),
        Err(pipeline_err) => {
            let mut api_err = ApiError::new(request.id, pipeline_err.error, state.config.debug);
            if let Some(status) = pipeline_err.status_override {
                api_err = api_err.with_status(status);
            }
            api_err.into_response()
        }
    }
}

/// `asap.ack`: acknowledge a previously delivered envelope. The server
/// keeps no delivery ledger for `POST /asap` (unlike the WebSocket
/// transport, where acks close the retransmit window), so this simply
/// confirms the id was well-formed.
fn handle_ack(request: RpcRequest) -> Response {
    match request.ack_envelope_id() {
        Ok(envelope_id) => {
            (StatusCode::OK, Json(RpcResponse::success(request.id, json!({ "envelope_id": envelope_id })))).into_response()
        }
        Err(err) => (StatusCode::OK, Json(err.into_response(request.id))).into_response(),
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Decompress the request body per `Content-Encoding`. Only `gzip` is
/// supported; any other value is rejected outright rather than silently
/// treated as identity, since forwarding a compressed body straight into
/// the JSON decoder would otherwise fail with a confusing parse error.
fn decompress_body(headers: &HeaderMap, body: &[u8]) -> Result<Vec<u8>, StatusCode> {
    match headers.get(axum::http::header::CONTENT_ENCODING).and_then(|v| v.to_str().ok()) {
        None | Some("identity") => Ok(body.to_vec()),
        Some("gzip") => {
            let mut out = Vec::new();
            GzDecoder::new(body).read_to_end(&mut out).map_err(|_| StatusCode::BAD_REQUEST)?;
            Ok(out)
        }
        Some(_) => Err(StatusCode::UNSUPPORTED_MEDIA_TYPE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_encoding_passes_through() {
        let headers = HeaderMap::new();
        assert_eq!(decompress_body(&headers, b"hello").unwrap(), b"hello");
    }

    #[test]
    fn gzip_body_round_trips() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_ENCODING, "gzip".parse().unwrap());
        assert_eq!(decompress_body(&headers, &compressed).unwrap(), b"hello");
    }

    #[test]
    fn unsupported_encoding_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_ENCODING, "br".parse().unwrap());
        assert_eq!(decompress_body(&headers, b"hello").unwrap_err(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn bearer_token_is_extracted_from_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn missing_authorization_header_is_none() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
