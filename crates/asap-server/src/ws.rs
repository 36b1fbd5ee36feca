//! The `WS /asap/ws` transport: the same JSON-RPC framing and envelope
//! pipeline as `POST /asap`, run once per frame instead of once per
//! request. The bearer token is read once from the upgrade request's
//! headers and reused for every frame on the connection; ASAP has no
//! per-frame re-authentication.

use std::net::SocketAddr;
use std::sync::Arc;

use asap_error::ErrorCode;
use asap_protocol::{RpcRequest, RpcResponse, METHOD_ACK, METHOD_SEND};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde_json::json;

use crate::error::asap_error_to_rpc_response;
use crate::pipeline::process_envelope;
use crate::rpc::bearer_token;
use crate::state::AppState;

/// Upgrade handler for `GET /asap/ws`.
pub async fn ws_asap(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let bearer = bearer_token(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr, bearer))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, addr: SocketAddr, bearer: Option<String>) {
    let client_addr = addr.to_string();

    loop {
        let message = match socket.recv().await {
            Some(Ok(message)) => message,
            Some(Err(_)) | None => break,
        };

        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        // Malformed frames are skipped rather than treated as a protocol
        // violation: one bad frame on a long-lived connection should not
        // tear down every other in-flight exchange.
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        let request = match RpcRequest::from_value(value) {
            Ok(r) => r,
            Err(err) => {
                send_json(&mut socket, &err.into_response(asap_protocol::RpcId::Null)).await;
                continue;
            }
        };
        if let Err(err) = request.require_known_method() {
            send_json(&mut socket, &err.into_response(request.id)).await;
            continue;
        }

        match request.method.as_str() {
            METHOD_SEND => {
                if !handle_send_frame(&mut socket, &state, request, &client_addr, bearer.as_deref()).await {
                    break;
                }
            }
            METHOD_ACK => handle_ack_frame(&mut socket, request).await,
            _ => unreachable!("require_known_method already rejected anything else"),
        }
    }
}

/// Returns `false` when the connection should be closed (a rate limit
/// violation, per §4.6/§4.10's close code `1008`).
async fn handle_send_frame(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    request: RpcRequest,
    client_addr: &str,
    bearer: Option<&str>,
) -> bool {
    let envelope = match request.envelope() {
        Ok(e) => e,
        Err(err) => {
            send_json(socket, &err.into_response(request.id)).await;
            return true;
        }
    };

    match process_envelope(state, envelope, client_addr, bearer).await {
        Ok(reply) => {
            send_json(socket, &RpcResponse::success_envelope(request.id, &reply)).await;
            true
        }
        Err(pipeline_err) => {
            let should_close = closes_connection(&pipeline_err.error);
            send_json(socket, &asap_error_to_rpc_response(request.id, &pipeline_err.error, state.config.debug)).await;
            if should_close {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame { code: 1008, reason: "rate limit exceeded".into() })))
                    .await;
                return false;
            }
            true
        }
    }
}

/// Whether a pipeline failure should tear down the WebSocket connection
/// rather than just send an error frame and keep reading. Only a rate
/// limit rejection does this (close code `1008`); every other failure
/// lets the caller retry on the same connection.
fn closes_connection(err: &asap_error::AsapError) -> bool {
    err.code() == ErrorCode::RateLimited
}

async fn handle_ack_frame(socket: &mut WebSocket, request: RpcRequest) {
    match request.ack_envelope_id() {
        Ok(envelope_id) => {
            send_json(socket, &RpcResponse::success(request.id, json!({ "envelope_id": envelope_id }))).await;
        }
        Err(err) => send_json(socket, &err.into_response(request.id)).await,
    }
}

async fn send_json(socket: &mut WebSocket, response: &RpcResponse) {
    if let Ok(text) = serde_json::to_string(response) {
        let _ = socket.send(Message::Text(text.into())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asap_error::{AsapError, ErrorCode};

    #[test]
    fn rate_limit_failures_close_the_connection() {
        let err = AsapError::new(ErrorCode::RateLimited, "too many requests");
        assert!(closes_connection(&err));
    }

    #[test]
    fn other_failures_keep_the_connection_open() {
        let err = AsapError::new(ErrorCode::ValidationFailed, "bad envelope");
        assert!(!closes_connection(&err));
    }
}
