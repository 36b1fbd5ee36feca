//! The `/.well-known/asap/*` discovery surface: the manifest document
//! with conditional GET, and the health check.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};

use crate::state::AppState;

/// `GET /.well-known/asap/manifest.json`. Honors `If-None-Match` against
/// an `ETag` derived from the manifest body, so a client polling on an
/// unchanged manifest gets a `304` rather than re-downloading it.
pub async fn get_manifest(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let body = match serde_json::to_vec(&state.manifest) {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let etag = etag_for(&body);

    if let Some(if_none_match) = headers.get(axum::http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == etag {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            insert_cache_headers(response.headers_mut(), &state, &etag);
            return response;
        }
    }

    let mut response = (StatusCode::OK, Json(state.manifest.clone())).into_response();
    insert_cache_headers(response.headers_mut(), &state, &etag);
    response
}

fn insert_cache_headers(headers: &mut HeaderMap, state: &AppState, etag: &str) {
    if let Ok(value) = etag.parse() {
        headers.insert(axum::http::header::ETAG, value);
    }
    let ttl = state.manifest.effective_ttl(state.config.manifest_ttl_seconds);
    if let Ok(value) = format!("max-age={ttl}").parse() {
        headers.insert(axum::http::header::CACHE_CONTROL, value);
    }
}

fn etag_for(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("\"{:x}\"", hasher.finalize())
}

/// `GET /.well-known/asap/health`.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Response {
    let report = asap_manifest::HealthReport::healthy(state.started_at);
    let status = StatusCode::from_u16(report.http_status()).unwrap_or(StatusCode::OK);
    (status, Json(report)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use asap_config::AsapConfig;

    async fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        AppState::new(AsapConfig::default(), dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn manifest_round_trips_through_conditional_get() {
        let state = test_state().await;
        let first = get_manifest(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let etag = first.headers().get(axum::http::header::ETAG).unwrap().to_str().unwrap().to_string();

        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::IF_NONE_MATCH, etag.parse().unwrap());
        let second = get_manifest(State(state), headers).await;
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn health_reports_200_for_a_running_server() {
        let state = test_state().await;
        let response = get_health(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
