//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{REFRESH_COOKIE_NAME, get_bearer_token, get_cookie};
use super::errors::ApiAuthError;
use super::state::HasSessionBackend;
use crate::session::ResolvedSession;

/// Extractor for API endpoints that require authentication.
///
/// Accepts a valid bearer access token as is. Otherwise falls back to the
/// refresh cookie and, if that checks out, carries a renewed access token that
/// the handler must hand back to the client.
pub struct ApiAuth(pub ResolvedSession);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let access_token = get_bearer_token(&parts.headers);
        let refresh_token = get_cookie(&parts.headers, REFRESH_COOKIE_NAME);

        state
            .sessions()
            .resolve_session(access_token, refresh_token)
            .await
            .map(ApiAuth)
            .map_err(|e| ApiAuthError::from_session(e, state.cookies().clear_refresh_cookie()))
    }
}
