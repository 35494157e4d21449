//! Shared error handling for API endpoints.
//!
//! Every failure reaches the client as `{code, message}`, with an extra
//! `errors` list for validation failures. Codes, messages and statuses are
//! fixed per variant.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::session::{FieldError, SessionError};

/// Client-visible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Internal,
    UserNotFound,
    UserAlreadyExists,
    ValidationFailed,
    LoginFailed,
    Unauthorized,
    InvalidApiKey,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Internal => 1000,
            Self::UserNotFound => 1001,
            Self::UserAlreadyExists => 1003,
            Self::ValidationFailed => 1004,
            Self::LoginFailed => 1005,
            Self::Unauthorized => 1006,
            Self::InvalidApiKey => 1007,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Internal => "Internal server error",
            Self::UserNotFound => "User not found",
            Self::UserAlreadyExists => "User already exists",
            Self::ValidationFailed => "Validation failed",
            Self::LoginFailed => "Email or password is incorrect",
            Self::Unauthorized => "Unauthorized",
            Self::InvalidApiKey => "Invalid or missing API key",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::UserAlreadyExists => StatusCode::CONFLICT,
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::LoginFailed | Self::Unauthorized | Self::InvalidApiKey => {
                StatusCode::UNAUTHORIZED
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    message: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl IntoResponse for ErrorCode {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    errors: Vec<FieldError>,
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            errors,
        }
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        ErrorCode::Internal.into()
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        Self {
            code,
            errors: Vec::new(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(errors) => Self::validation(errors),
            SessionError::UserAlreadyExists => ErrorCode::UserAlreadyExists.into(),
            SessionError::LoginFailed => ErrorCode::LoginFailed.into(),
            SessionError::Unauthorized(_) => ErrorCode::Unauthorized.into(),
            SessionError::UserNotFound => ErrorCode::UserNotFound.into(),
            // Already logged where it happened.
            SessionError::Internal(_) => ErrorCode::Internal.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(vec![FieldError::new("body", rejection.body_text())])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code.status(),
            Json(ErrorResponse {
                code: self.code.code(),
                message: self.code.message(),
                errors: self.errors,
            }),
        )
            .into_response()
    }
}
