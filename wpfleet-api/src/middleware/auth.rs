//! Shared-secret authentication: every endpoint except `/api/health*`
//! requires a matching `X-API-Key` header.

use crate::state::AppState;
use axum::{extract::Request, extract::State, http::StatusCode, middleware::Next, response::Response};

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok());

    match provided {
        Some(key) if key == state.config.api_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
