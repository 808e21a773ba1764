pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod orchestrate;
pub mod state;
pub mod store;
pub mod worker;

pub use config::Config;
pub use state::AppState;
pub use store::Store;

use axum::{middleware as axum_middleware, routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

/// Builds the full HTTP router over a given [`AppState`]: public health
/// routes plus every `X-API-Key`-gated endpoint. Factored out of the
/// binary's `main` so integration tests can stand up the real app over
/// fake adapters and an in-memory store.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/health/live", get(handlers::health::live))
        .route("/api/health/ready", get(handlers::health::ready));

    let protected_routes = Router::new()
        .route("/api/provision", post(handlers::sites::provision))
        .route("/api/static/provision", post(handlers::sites::static_provision))
        .route("/api/destroy", post(handlers::sites::destroy))
        .route("/api/sites", get(handlers::sites::list_sites))
        .route(
            "/api/sites/:site",
            get(handlers::sites::get_site).delete(handlers::sites::hard_delete_site),
        )
        .route(
            "/api/sites/:site/domain",
            post(handlers::domain::attach_domain).delete(handlers::domain::detach_domain),
        )
        .route("/api/sites/:site/domain/status", get(handlers::domain::domain_status))
        .route("/api/sites/:site/cert-retry", post(handlers::domain::cert_retry))
        .route(
            "/api/jobs/:id",
            get(handlers::jobs::get_job).delete(handlers::jobs::hard_delete_job),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum_middleware::from_fn(middleware::request_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
