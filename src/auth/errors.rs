//! Authentication error types.

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

use crate::api::ErrorCode;
use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthErrorKind {
    Unauthorized,
    Internal,
}

/// Rejection of the `ApiAuth` extractor. Renders the standard error body and,
/// when the reason calls for it, clears the refresh cookie.
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    clear_cookie: Option<String>,
}

impl ApiAuthError {
    pub(super) fn from_session(error: SessionError, clear_cookie: String) -> Self {
        match error {
            SessionError::Unauthorized(reason) => Self {
                kind: AuthErrorKind::Unauthorized,
                clear_cookie: reason.clears_refresh_cookie().then_some(clear_cookie),
            },
            _ => Self {
                kind: AuthErrorKind::Internal,
                clear_cookie: None,
            },
        }
    }

    fn code(&self) -> ErrorCode {
        match self.kind {
            AuthErrorKind::Unauthorized => ErrorCode::Unauthorized,
            AuthErrorKind::Internal => ErrorCode::Internal,
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let mut response = self.code().into_response();

        if let Some(cookie) = self.clear_cookie {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
