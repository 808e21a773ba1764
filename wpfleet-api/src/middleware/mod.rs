pub mod auth;
pub mod request_context;

pub use auth::auth_middleware;
pub use request_context::request_context_middleware;
