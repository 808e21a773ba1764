//! Request-scoped correlation/request IDs and structured span fields,
//! attached to every request before it reaches a handler.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{info, instrument, Span};
use wpfleet_logging::fields;

pub const CORRELATION_ID_HEADER: &str = "x-wpfleet-correlation-id";
pub const REQUEST_ID_HEADER: &str = "x-wpfleet-request-id";

#[instrument(
    name = "request_context",
    skip_all,
    fields(
        correlation_id = tracing::field::Empty,
        request_id = tracing::field::Empty,
        http.method = %request.method(),
        http.path = %request.uri().path(),
        http.user_agent = tracing::field::Empty,
        http.status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
)]
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let correlation_id = wpfleet_logging::new_correlation_id();
    let request_id = wpfleet_logging::new_request_id();

    Span::current().record(fields::CORRELATION_ID, &correlation_id);
    Span::current().record(fields::REQUEST_ID, &request_id);

    if let Some(user_agent) = request.headers().get("user-agent") {
        if let Ok(ua_str) = user_agent.to_str() {
            Span::current().record(fields::HTTP_USER_AGENT, ua_str);
        }
    }

    info!(operation = "http_request_start", "processing HTTP request");

    let start = std::time::Instant::now();
    let mut response = next.run(request).await;
    let duration = start.elapsed();

    Span::current().record(fields::HTTP_STATUS, response.status().as_u16());
    Span::current().record(fields::DURATION_MS, duration.as_millis());

    add_context_headers(response.headers_mut(), &correlation_id, &request_id);

    info!(
        operation = "http_request_complete",
        operation.status = "success",
        "HTTP request completed"
    );

    response
}

fn add_context_headers(headers: &mut HeaderMap, correlation_id: &str, request_id: &str) {
    if let Ok(v) = HeaderValue::from_str(correlation_id) {
        headers.insert(CORRELATION_ID_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, v);
    }
}
