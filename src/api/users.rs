//! User account endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Check credentials, return an access token, set the refresh cookie
//! - POST `/logout` - Clear the refresh cookie
//! - GET `/me` - Current profile
//! - PATCH `/me` - Update name, birth date or address

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, header::SET_COOKIE},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;

use super::error::{ApiError, ResultExt};
use super::validation::{LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::auth::{ApiAuth, CookieSettings, HasSessionBackend};
use crate::credentials::UserProfile;
use crate::session::SessionService;

#[derive(Clone)]
pub struct UsersState {
    pub sessions: SessionService,
    pub cookies: CookieSettings,
}

impl HasSessionBackend for UsersState {
    fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    fn cookies(&self) -> &CookieSettings {
        &self.cookies
    }
}

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me).patch(update_me))
        .with_state(state)
}

/// Profile plus the access token, when one was issued for this response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(flatten)]
    profile: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn register(
    State(state): State<UsersState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let input = payload.validate().map_err(ApiError::validation)?;

    let user = state.sessions.register(input).await?;

    Ok(Json(user))
}

async fn login(
    State(state): State<UsersState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let input = payload.validate().map_err(ApiError::validation)?;

    let outcome = state.sessions.login(&input.email, &input.password).await?;

    let cookie = HeaderValue::from_str(
        &state
            .cookies
            .refresh_cookie(&outcome.refresh_token.token, outcome.refresh_token.duration),
    )
    .internal_err("Failed to build refresh cookie")?;

    Ok((
        [(SET_COOKIE, cookie)],
        Json(ProfileResponse {
            profile: outcome.profile,
            access_token: Some(outcome.access_token.token),
        }),
    ))
}

/// Always succeeds, whether or not a refresh cookie was present.
async fn logout(State(state): State<UsersState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, state.cookies.clear_refresh_cookie())],
        Json(MessageResponse {
            message: "Logged out",
        }),
    )
}

async fn me(
    State(state): State<UsersState>,
    ApiAuth(session): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.sessions.get_profile(&session.user_id).await?;

    Ok(Json(ProfileResponse {
        profile,
        access_token: session.renewed_access_token,
    }))
}

async fn update_me(
    State(state): State<UsersState>,
    ApiAuth(session): ApiAuth,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let fields = payload.validate().map_err(ApiError::validation)?;

    let profile = state
        .sessions
        .update_profile(&session.user_id, &fields)
        .await?;

    Ok(Json(ProfileResponse {
        profile,
        access_token: session.renewed_access_token,
    }))
}
