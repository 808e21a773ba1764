use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use wpfleet_core::Error as CoreError;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(CoreError::Anyhow(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::SiteNotFound(id) => (StatusCode::NOT_FOUND, format!("site not found: {id}")),
            CoreError::JobNotFound(id) => (StatusCode::NOT_FOUND, format!("job not found: {id}")),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            CoreError::DomainTaken(domain) => {
                (StatusCode::CONFLICT, format!("domain already claimed: {domain}"))
            }
            CoreError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                format!("cannot move site from {from} to {to}"),
            ),
            CoreError::Adapter { subsystem, underlying } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{subsystem} error: {underlying}"),
            ),
            CoreError::InvariantViolation(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("invariant violation: {msg}"))
            }
            CoreError::Anyhow(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
