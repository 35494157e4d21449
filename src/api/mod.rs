mod error;
mod users;
pub mod validation;

use axum::{Json, Router, middleware, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::api_key::{ApiKey, require_api_key};
use crate::auth::CookieSettings;
use crate::session::SessionService;

pub use error::{ApiError, ErrorCode};

/// Version embedded at compile time from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the API router.
///
/// Everything except the liveness probe at the root sits behind the API key.
pub fn create_api_router(
    sessions: SessionService,
    cookies: CookieSettings,
    api_key: Arc<ApiKey>,
) -> Router {
    let users_state = users::UsersState { sessions, cookies };

    let protected = Router::new()
        .nest("/users", users::router(users_state))
        .layer(middleware::from_fn_with_state(api_key, require_api_key));

    Router::new().route("/", get(health)).merge(protected)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
    })
}
