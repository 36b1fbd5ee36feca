//! The shared envelope-processing pipeline: replay guards, rate limiting,
//! auth and identity binding, dispatch, and the metering hook. Both the
//! `POST /asap` handler and the WebSocket frame loop run every inbound
//! envelope through [`process_envelope`] so the two transports can never
//! drift apart on semantics.

use std::time::{Duration, Instant};

use asap_core::{AgentUrn, Envelope, Payload, TaskResponsePayload};
use asap_error::{AsapError, ErrorCode};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// Nonce TTL applied to every envelope id recorded by the replay guard:
/// long enough to span the acceptance window's look-back, short enough
/// that the nonce store does not grow without bound.
const NONCE_TTL: Duration = Duration::from_secs(600);

/// A pipeline failure, carrying the taxonomy error plus an optional HTTP
/// status override for failures whose status depends on more than the
/// taxonomy code (JWKS outages, payload size).
pub struct PipelineError {
    /// The underlying taxonomy error.
    pub error: AsapError,
    /// Status to use instead of `error.code().http_status()`, if any.
    pub status_override: Option<StatusCode>,
}

impl PipelineError {
    fn from_asap(error: AsapError) -> Self {
        Self { error, status_override: None }
    }

    fn with_status(error: AsapError, status: StatusCode) -> Self {
        Self { error, status_override: Some(status) }
    }
}

/// Run one envelope through the full pipeline, returning the reply
/// envelope to send back. `bearer_token` is the `Authorization: Bearer`
/// value, if any; `client_addr` identifies the caller when the envelope
/// carries no `sender` yet (never the case for a validated envelope, but
/// kept for parity with the rate limiter's general key derivation).
pub async fn process_envelope(
    state: &AppState,
    envelope: Envelope,
    client_addr: &str,
    bearer_token: Option<&str>,
) -> Result<Envelope, PipelineError> {
    let started = Instant::now();
    let method = envelope.payload.payload_type().to_string();
    let bytes_in = envelope.encode().map(|b| b.len() as u64).unwrap_or(0);

    let result = process_envelope_inner(state, envelope, client_addr, bearer_token).await;

    let (outcome, bytes_out) = match &result {
        Ok(reply) => (asap_telemetry::RequestOutcome::Ok, reply.encode().map(|b| b.len() as u64).unwrap_or(0)),
        Err(_) => (asap_telemetry::RequestOutcome::Error, 0),
    };
    state.metrics.record(asap_telemetry::RequestMetrics {
        method,
        duration_ms: started.elapsed().as_millis() as u64,
        outcome,
        bytes_in,
        bytes_out,
    });

    result
}

async fn process_envelope_inner(
    state: &AppState,
    envelope: Envelope,
    client_addr: &str,
    bearer_token: Option<&str>,
) -> Result<Envelope, PipelineError> {
    let now = Utc::now();

    state
        .replay_guard
        .check(envelope.timestamp, now, Some(&envelope.id), NONCE_TTL)
        .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;

    let sender = envelope.sender.to_string();
    let key = asap_ratelimit::identity_key(Some(&sender), client_addr);
    state.rate_limiter.check(key, Instant::now()).map_err(|rejection| {
        let retry_after = rejection.retry_after_seconds;
        PipelineError::with_status(
            rejection.into_asap_error().with_context("retry_after_seconds", retry_after),
            StatusCode::TOO_MANY_REQUESTS,
        )
    })?;

    authenticate(state, &envelope, bearer_token).await?;

    let recipient = envelope.recipient.to_string();
    let idempotency_key = match &envelope.payload {
        Payload::TaskRequest(req) => req.idempotency_key.clone(),
        _ => None,
    };
    if let Some(key) = &idempotency_key {
        if let Some(cached) = state.idempotency.get(&recipient, key).await {
            return Ok(cached);
        }
    }

    let reply_payload = dispatch_payload(state, &envelope).await?;
    let reply = envelope.reply(envelope.recipient.clone(), reply_payload);

    if let Some(key) = &idempotency_key {
        state.idempotency.put_if_absent(&recipient, key, reply.clone()).await;
    }

    state.metering.record_event(asap_metering::MeteringEvent {
        agent_id: sender,
        period: now.format("%Y-%m").to_string(),
        event_type: envelope.payload.payload_type().to_string(),
        cost_units: 1,
        recorded_at: now,
    });

    Ok(reply)
}

/// Extract bearer token; absent with no JWKS configured passes through
/// untouched (no identity check runs). Absent with JWKS configured is
/// `401`. Present tokens are verified and must resolve to the envelope's
/// `sender`.
async fn authenticate(state: &AppState, envelope: &Envelope, bearer_token: Option<&str>) -> Result<(), PipelineError> {
    let Some(jwks_url) = state.config.auth_jwks_url.as_deref() else {
        return Ok(());
    };
    let Some(token) = bearer_token else {
        return Err(PipelineError::from_asap(
            asap_auth::AuthError::AuthRequired.into_asap_error(),
        ));
    };

    let claims = asap_auth::verify_token(
        &state.jwks,
        jwks_url,
        token,
        state.config.auth_issuer.as_deref(),
        state.config.auth_audience.as_deref(),
    )
    .await
    .map_err(|e| {
        let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        PipelineError::with_status(e.into_asap_error(), status)
    })?;

    state
        .identity_binding
        .require_matches_sender(&claims, &envelope.sender.to_string())
        .map_err(|e| PipelineError::from_asap(e.into_asap_error()))
}

/// Route `envelope.payload` to the right handling: `task.request` and
/// `mcp.tool_call` go through the skill registry; every other payload
/// type is core protocol semantics handled directly here.
async fn dispatch_payload(state: &AppState, envelope: &Envelope) -> Result<Payload, PipelineError> {
    match &envelope.payload {
        Payload::TaskRequest(req) => {
            // The first `task.request` for a given envelope id opens the
            // task's lifecycle; `envelope.id` becomes `task_id` so a later
            // `task.update`/`task.cancel` can address it, and `trace_id`
            // doubles as the conversation id since envelopes carry no
            // separate field for one.
            let task_id = envelope.id.clone();
            state.tasks.put(asap_task::Task::new(task_id.clone(), envelope.trace_id.clone(), Utc::now())).await;
            state
                .tasks
                .transition(&task_id, asap_task::Status::Working, Utc::now(), None)
                .await
                .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;

            match state.skills.dispatch(&req.skill_id, req.input.clone()).await {
                Ok(result) => {
                    state
                        .tasks
                        .transition(&task_id, asap_task::Status::Completed, Utc::now(), None)
                        .await
                        .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;
                    Ok(Payload::TaskResponse(TaskResponsePayload {
                        status: "completed".to_string(),
                        result: Some(result),
                        error: None,
                    }))
                }
                Err(err) => {
                    let _ = state.tasks.transition(&task_id, asap_task::Status::Failed, Utc::now(), None).await;
                    Err(PipelineError::from_asap(err))
                }
            }
        }
        Payload::McpToolCall(call) => {
            let result = state
                .skills
                .dispatch(&call.tool_name, call.arguments.clone())
                .await
                .map_err(PipelineError::from_asap)?;
            Ok(Payload::McpToolResult(asap_core::McpToolResultPayload {
                tool_name: call.tool_name.clone(),
                content: result,
                is_error: false,
            }))
        }
        Payload::MessageSend(msg) => Ok(Payload::MessageSend(msg.clone())),
        Payload::StateQuery(query) => {
            let snapshot = state
                .snapshots
                .get(&query.task_id, query.version)
                .await
                .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;
            Ok(snapshot_reply(snapshot))
        }
        Payload::StateRestore(restore) => {
            let snapshot = state
                .snapshots
                .get(&restore.task_id, restore.from_version)
                .await
                .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;
            Ok(snapshot_reply(snapshot))
        }
        Payload::TaskCancel(cancel) => {
            let task = state
                .tasks
                .transition(&cancel.task_id, asap_task::Status::Cancelled, Utc::now(), None)
                .await
                .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;
            Ok(Payload::TaskResponse(TaskResponsePayload {
                status: task.status.as_str().to_string(),
                result: None,
                error: None,
            }))
        }
        Payload::TaskUpdate(update) => {
            let task = state
                .tasks
                .update_progress(&update.task_id, update.progress, Utc::now())
                .await
                .map_err(|e| PipelineError::from_asap(e.into_asap_error()))?;
            Ok(Payload::TaskResponse(TaskResponsePayload {
                status: task.status.as_str().to_string(),
                result: None,
                error: None,
            }))
        }
        Payload::TaskResponse(resp) => Ok(Payload::TaskResponse(resp.clone())),
        Payload::ArtifactNotify(notify) => Ok(Payload::ArtifactNotify(notify.clone())),
        Payload::McpToolResult(result) => Ok(Payload::McpToolResult(result.clone())),
    }
}

fn snapshot_reply(snapshot: Option<asap_snapshot::StateSnapshot>) -> Payload {
    match snapshot {
        Some(s) => Payload::TaskResponse(TaskResponsePayload {
            status: "completed".to_string(),
            result: Some(json!({
                "task_id": s.task_id,
                "version": s.version,
                "data": s.data,
                "checkpoint": s.checkpoint,
            })),
            error: None,
        }),
        None => Payload::TaskResponse(TaskResponsePayload {
            status: "failed".to_string(),
            result: None,
            error: Some(json!({"message": "no snapshot found"})),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asap_core::{EnvelopeBuilder, MessageSendPayload};

    fn sample_envelope() -> Envelope {
        let sender = AgentUrn::new("acme", "client").unwrap();
        let recipient = AgentUrn::new("acme", "server").unwrap();
        EnvelopeBuilder::new(sender, recipient, Payload::MessageSend(MessageSendPayload { body: json!("hi") })).build()
    }

    async fn test_state() -> std::sync::Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        AppState::new(asap_config::AsapConfig::default(), dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn message_send_echoes_back_as_a_reply() {
        let state = test_state().await;
        let envelope = sample_envelope();
        let reply = process_envelope(&state, envelope.clone(), "127.0.0.1:1", None).await.unwrap();
        assert_eq!(reply.correlation_id.as_deref(), Some(envelope.id.as_str()));
        assert_eq!(reply.sender.to_string(), envelope.recipient.to_string());
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let state = test_state().await;
        let mut envelope = sample_envelope();
        envelope.timestamp = Utc::now() - chrono::Duration::seconds(600);
        let err = process_envelope(&state, envelope, "127.0.0.1:1", None).await.unwrap_err();
        assert_eq!(err.error.code(), ErrorCode::InvalidTimestamp);
    }

    #[tokio::test]
    async fn absent_bearer_token_passes_when_auth_not_configured() {
        let state = test_state().await;
        let envelope = sample_envelope();
        assert!(process_envelope(&state, envelope, "127.0.0.1:1", None).await.is_ok());
    }

    #[tokio::test]
    async fn task_request_dispatches_to_the_echo_skill() {
        let state = test_state().await;
        let sender = AgentUrn::new("acme", "client").unwrap();
        let recipient = AgentUrn::new("acme", "server").unwrap();
        let envelope = EnvelopeBuilder::new(
            sender,
            recipient,
            Payload::TaskRequest(asap_core::TaskRequestPayload {
                skill_id: "echo".to_string(),
                input: json!({"x": 1}),
                idempotency_key: None,
            }),
        )
        .build();
        let reply = process_envelope(&state, envelope, "127.0.0.1:1", None).await.unwrap();
        match reply.payload {
            Payload::TaskResponse(r) => assert_eq!(r.result, Some(json!({"x": 1}))),
            other => panic!("expected task.response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_the_original_reply_without_redispatch() {
        let state = test_state().await;
        let sender = AgentUrn::new("acme", "client").unwrap();
        let recipient = AgentUrn::new("acme", "server").unwrap();
        let build = || {
            EnvelopeBuilder::new(
                sender.clone(),
                recipient.clone(),
                Payload::TaskRequest(asap_core::TaskRequestPayload {
                    skill_id: "echo".to_string(),
                    input: json!({"x": 1}),
                    idempotency_key: Some("dup-1".to_string()),
                }),
            )
            .build()
        };

        let request1 = build();
        let first = process_envelope(&state, request1.clone(), "127.0.0.1:1", None).await.unwrap();
        let second = process_envelope(&state, build(), "127.0.0.1:1", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.correlation_id.as_deref(), Some(request1.id.as_str()));
    }

    #[tokio::test]
    async fn eleventh_request_in_a_second_is_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let config = asap_config::AsapConfig { rate_limit: "2/second".to_string(), ..Default::default() };
        let state = AppState::new(config, dir.path().to_path_buf()).unwrap();

        let mut last = Ok(());
        for _ in 0..3 {
            let mut envelope = sample_envelope();
            envelope.id = asap_core::generate_id();
            last = process_envelope(&state, envelope, "127.0.0.1:1", None).await.map(|_| ());
        }
        let err = last.unwrap_err();
        assert_eq!(err.error.code(), ErrorCode::RateLimited);
        assert_eq!(err.status_override, Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn failed_requests_are_recorded_with_error_outcome() {
        let state = test_state().await;
        let mut envelope = sample_envelope();
        envelope.timestamp = Utc::now() - chrono::Duration::seconds(600);
        process_envelope(&state, envelope, "127.0.0.1:1", None).await.unwrap_err();

        let recorded = state.metrics.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].outcome, asap_telemetry::RequestOutcome::Error);
    }
}
