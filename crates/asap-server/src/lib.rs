// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ASAP protocol runtime (C8): the `POST /asap` and `WS /asap/ws`
//! transports share one envelope pipeline ([`pipeline`]) for replay
//! guards, rate limiting, auth, dispatch, and metering. Discovery
//! ([`manifest_routes`]) and the operator REST surface ([`operator`])
//! round out the external interface.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod identity_config;
pub mod idempotency;
pub mod manifest_routes;
pub mod middleware;
pub mod operator;
pub mod pipeline;
pub mod rpc;
pub mod state;
pub mod task_store;
pub mod ws;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the Axum router with every route this runtime serves, wired
/// against a shared [`AppState`].
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/asap", post(rpc::post_asap))
        .route("/asap/ws", get(ws::ws_asap))
        .route("/.well-known/asap/manifest.json", get(manifest_routes::get_manifest))
        .route("/.well-known/asap/health", get(manifest_routes::get_health))
        .route("/asap/metrics", get(operator::get_metrics))
        .route("/usage/{agent_id}", get(operator::get_usage))
        .route("/sla", get(operator::list_sla).post(operator::register_sla))
        .route("/sla/{agent_id}", get(operator::get_sla))
        .route("/asap/delegations", get(operator::list_delegations).post(operator::issue_delegation))
        .route("/asap/delegations/{jti}", delete(operator::revoke_delegation))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}
