//! Static API key check applied in front of every account route.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::api::ErrorCode;

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The configured key.
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Constant-time comparison against a presented key.
    pub fn matches(&self, presented: &str) -> bool {
        presented.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}

/// Middleware rejecting requests without the right `x-api-key` header.
pub async fn require_api_key(
    State(key): State<Arc<ApiKey>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let present = presented.is_some();
    let authorized = presented.is_some_and(|p| key.matches(p));

    if authorized {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        present,
        "Rejected request with invalid or missing API key"
    );
    ErrorCode::InvalidApiKey.into_response()
}
