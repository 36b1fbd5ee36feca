//! Operator REST surface: Prometheus metrics export, metering usage
//! queries, SLA target registration, and delegation token issuance /
//! revocation. None of this rides the JSON-RPC envelope; it is plain
//! REST for operators and dashboards, not agent-to-agent traffic.

use std::sync::Arc;

use asap_core::generate_id;
use asap_delegation::{issue_token, DelegationClaims};
use asap_metering::SlaTarget;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

/// `GET /asap/metrics`: Prometheus text exposition of collected request
/// metrics.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    let summary = state.metrics.summary();
    match asap_telemetry::PrometheusExporter.export(&summary) {
        Ok(body) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn default_limit() -> usize {
    100
}

/// Query parameters accepted by `GET /usage/:agent_id`.
#[derive(Deserialize)]
pub struct UsageQuery {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: i64,
}

/// A page of metering events plus the total matching count, for
/// pagination metadata.
#[derive(Serialize)]
struct UsagePage {
    events: Vec<asap_metering::MeteringEvent>,
    total: usize,
}

/// `GET /usage/:agent_id?start=...&end=...&limit=...&offset=...`.
pub async fn get_usage(State(state): State<Arc<AppState>>, Path(agent_id): Path<String>, Query(query): Query<UsageQuery>) -> Response {
    let events = match state.metering.query_metrics(&agent_id, query.start, query.end, query.limit, query.offset) {
        Ok(events) => events,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    };
    let total = state.metering.count_metrics(&agent_id, query.start, query.end);
    (StatusCode::OK, Json(UsagePage { events, total })).into_response()
}

/// `GET /sla`: every registered SLA target.
pub async fn list_sla(State(state): State<Arc<AppState>>) -> Response {
    let targets = state.sla_targets.read().await;
    (StatusCode::OK, Json(targets.clone())).into_response()
}

/// `GET /sla/:agent_id`: the target for one agent, `404` if none is
/// registered.
pub async fn get_sla(State(state): State<Arc<AppState>>, Path(agent_id): Path<String>) -> Response {
    let targets = state.sla_targets.read().await;
    match targets.iter().find(|t| t.agent_id == agent_id) {
        Some(target) => (StatusCode::OK, Json(target.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Body accepted by `POST /sla`.
#[derive(Deserialize)]
pub struct RegisterSlaRequest {
    agent_id: String,
    uptime_percent: String,
    success_rate_percent: String,
}

/// `POST /sla`: register or replace the target for `agent_id`.
pub async fn register_sla(State(state): State<Arc<AppState>>, Json(request): Json<RegisterSlaRequest>) -> Response {
    let target = match SlaTarget::new(&request.agent_id, &request.uptime_percent, &request.success_rate_percent) {
        Ok(target) => target,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    };

    let mut targets = state.sla_targets.write().await;
    targets.retain(|t| t.agent_id != target.agent_id);
    targets.push(target.clone());
    (StatusCode::CREATED, Json(target)).into_response()
}

/// Body accepted by `POST /asap/delegations`.
#[derive(Deserialize)]
pub struct IssueDelegationRequest {
    issuer: String,
    delegate: String,
    scope: Vec<String>,
    max_cost_units: u64,
    ttl_seconds: u64,
}

/// The response to a successful delegation issuance.
#[derive(Serialize)]
struct IssuedDelegation {
    token: String,
    jti: String,
    exp: u64,
}

/// `POST /asap/delegations`: mint a delegation token and record the
/// delegation edge for cascade revocation.
pub async fn issue_delegation(State(state): State<Arc<AppState>>, Json(request): Json<IssueDelegationRequest>) -> Response {
    let jti = generate_id();
    let exp = (Utc::now().timestamp() as u64).saturating_add(request.ttl_seconds);
    let claims = DelegationClaims {
        iss: request.issuer.clone(),
        sub: request.delegate.clone(),
        scope: request.scope,
        exp,
        max_cost_units: request.max_cost_units,
        jti: jti.clone(),
    };

    match issue_token(&state.delegation_encoding_key, &claims) {
        Ok(token) => {
            state.revocations.record_delegation(&request.issuer, &jti);
            (StatusCode::CREATED, Json(IssuedDelegation { token, jti, exp })).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// `GET /asap/delegations`: every revocation recorded so far.
pub async fn list_delegations(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.revocations.revocations())).into_response()
}

/// `DELETE /asap/delegations/:jti`: revoke `jti` and every token
/// delegated from it, cascading through the delegation graph.
pub async fn revoke_delegation(State(state): State<Arc<AppState>>, Path(jti): Path<String>) -> Response {
    let revoked = state.revocations.revoke_cascade(&jti, "operator revocation", Utc::now());
    (StatusCode::OK, Json(json!({ "revoked": revoked }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use asap_config::AsapConfig;
    use chrono::Duration;

    async fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        AppState::new(AsapConfig::default(), dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn usage_query_paginates_recorded_events() {
        let state = test_state().await;
        for _ in 0..3 {
            state.metering.record_event(asap_metering::MeteringEvent {
                agent_id: "urn:asap:agent:acme:client".to_string(),
                period: "2026-07".to_string(),
                event_type: "task.request".to_string(),
                cost_units: 1,
                recorded_at: Utc::now(),
            });
        }
        let query = UsageQuery { start: Utc::now() - Duration::minutes(5), end: Utc::now() + Duration::minutes(5), limit: 2, offset: 0 };
        let response = get_usage(State(state), Path("urn:asap:agent:acme:client".to_string()), Query(query)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sla_round_trips_through_register_and_get() {
        let state = test_state().await;
        let request = RegisterSlaRequest {
            agent_id: "urn:asap:agent:acme:worker".to_string(),
            uptime_percent: "99.9".to_string(),
            success_rate_percent: "95".to_string(),
        };
        let created = register_sla(State(state.clone()), Json(request)).await;
        assert_eq!(created.status(), StatusCode::CREATED);

        let found = get_sla(State(state), Path("urn:asap:agent:acme:worker".to_string())).await;
        assert_eq!(found.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_sla_target_is_404() {
        let state = test_state().await;
        let response = get_sla(State(state), Path("urn:asap:agent:unknown:x".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delegation_issues_and_cascade_revokes() {
        let state = test_state().await;
        let request = IssueDelegationRequest {
            issuer: "urn:asap:agent:acme:root".to_string(),
            delegate: "urn:asap:agent:acme:delegate".to_string(),
            scope: vec!["task.request".to_string()],
            max_cost_units: 1000,
            ttl_seconds: 3600,
        };
        let issued = issue_delegation(State(state.clone()), Json(request)).await;
        assert_eq!(issued.status(), StatusCode::CREATED);

        let revoked = revoke_delegation(State(state.clone()), Path("urn:asap:agent:acme:root".to_string())).await;
        assert_eq!(revoked.status(), StatusCode::OK);
        assert!(state.revocations.is_revoked("urn:asap:agent:acme:root"));
    }
}
