// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests driving [`asap_ws::WsTransport`] against a real
//! axum WebSocket endpoint, mirroring the protocol a compliant ASAP
//! peer implements: echo an ack for every `asap.send` frame.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use asap_core::{AgentUrn, EnvelopeBuilder, MessageSendPayload, Payload};
use asap_ws::{ConnectionConfig, TransportConfig, TransportMode, WsTransport};

#[derive(Clone, Default)]
struct ServerState {
    drop_first_send: std::sync::Arc<std::sync::atomic::AtomicBool>,
    echo_as_send: bool,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };
        let value: Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if value.get("method").and_then(Value::as_str) != Some("asap.send") {
            continue;
        }
        if state.drop_first_send.swap(false, std::sync::atomic::Ordering::SeqCst) {
            // Simulate a frame the server never acks, as if it were lost.
            continue;
        }
        let envelope = value.get("params").and_then(|p| p.get("envelope")).cloned();
        let envelope_id = envelope.as_ref().and_then(|e| e.get("id")).and_then(Value::as_str).map(str::to_string);
        if let Some(id) = envelope_id {
            let ack = json!({
                "jsonrpc": "2.0",
                "method": "asap.ack",
                "params": { "envelope_id": id },
                "id": Value::Null,
            });
            if socket.send(WsMessage::Text(serde_json::to_string(&ack).unwrap().into())).await.is_err() {
                return;
            }
            if state.echo_as_send {
                let echoed = json!({
                    "jsonrpc": "2.0",
                    "method": "asap.send",
                    "params": { "envelope": envelope },
                    "id": Value::Null,
                });
                if socket.send(WsMessage::Text(serde_json::to_string(&echoed).unwrap().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn spawn_server(drop_first_send: bool, echo_as_send: bool) -> SocketAddr {
    let state = ServerState {
        drop_first_send: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(drop_first_send)),
        echo_as_send,
    };
    let app = Router::new().route("/ws", get(ws_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn test_envelope() -> asap_core::Envelope {
    let sender = AgentUrn::new("acme", "sender").unwrap();
    let recipient = AgentUrn::new("acme", "recipient").unwrap();
    let payload = Payload::MessageSend(MessageSendPayload { body: Value::String("hi".to_string()) });
    EnvelopeBuilder::new(sender, recipient, payload).build()
}

fn quick_config() -> TransportConfig {
    TransportConfig {
        connection: ConnectionConfig {
            heartbeat_interval: Duration::from_secs(60),
            pong_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_millis(500),
            send_rate_capacity: 10.0,
            send_rate_refill_per_second: 10.0,
        },
        mode: TransportMode::OneShot,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn send_gets_acked_by_a_compliant_peer() {
    let addr = spawn_server(false, false).await;
    let url = format!("ws://{addr}/ws");
    let transport = WsTransport::connect(url, quick_config()).await.unwrap();

    let envelope = test_envelope();
    transport.send(&envelope).await.unwrap();
}

#[tokio::test]
async fn unacked_send_times_out_with_an_error() {
    let addr = spawn_server(true, false).await;
    let url = format!("ws://{addr}/ws");
    let transport = WsTransport::connect(url, quick_config()).await.unwrap();

    let envelope = test_envelope();
    let err = transport.send(&envelope).await.unwrap_err();
    assert!(matches!(err, asap_ws::TransportError::Connection(asap_ws::ConnectionError::AckTimeout(_))));
}

#[tokio::test]
async fn inbound_envelope_is_forwarded_to_subscribers() {
    let addr = spawn_server(false, true).await;
    let url = format!("ws://{addr}/ws");
    let transport = WsTransport::connect(url, quick_config()).await.unwrap();
    let mut rx = transport.subscribe();

    let envelope = test_envelope();
    transport.send(&envelope).await.unwrap();

    let received = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.id, envelope.id);
}
