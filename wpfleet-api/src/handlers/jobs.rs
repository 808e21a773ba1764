//! Job-queue introspection endpoints.

use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use wpfleet_core::models::Job;

/// `GET /api/jobs/:id`
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    Ok(Json(state.store.get_job(&job_id).await?))
}

/// `DELETE /api/jobs/:id` — hard delete, gated on the job not being
/// `PENDING`/`PROCESSING`.
pub async fn hard_delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.store.hard_delete_job(&job_id).await?;
    Ok(Json(serde_json::json!({ "deleted": job_id })))
}
