use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use mailrelay_core::PendingAuthorizationStore;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pending: Arc<PendingAuthorizationStore>,
    agent_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub pending_authorizations: usize,
    pub checked_at: String,
}

pub fn router(pending: Arc<PendingAuthorizationStore>, agent_name: String) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { pending, agent_name })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!("mailrelay-server relaying to agent `{}`", state.agent_name),
        },
        pending_authorizations: state.pending.len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
