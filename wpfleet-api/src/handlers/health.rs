//! Health, liveness, and readiness probes for container orchestration.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store_ok = state.store.list_sites().await.is_ok();
    Json(json!({ "status": if store_ok { "ok" } else { "degraded" } }))
}

pub async fn live() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.store.list_sites().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
