//! Registration, login, profile access and the access-token renewal protocol.
//!
//! `resolve_session` runs on every protected request and settles it in one
//! pass:
//! - no bearer token: rejected, the refresh cookie is not looked at
//! - bearer token verifies: accepted as is, the store is not consulted
//! - bearer token fails: the refresh cookie is verified, its subject is
//!   cross-checked against the subject claimed by the failed access token,
//!   and a fresh access token is minted for that user

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialStore, NewUser, ProfileFields, StoreError, UserProfile};
use crate::jwt::{IssuedToken, JwtConfig};
use crate::password;

/// Why a protected request was turned away. Logged, never shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// No bearer token on the request
    NoToken,
    /// Access token invalid or expired and no refresh cookie to fall back on
    MissingRefreshToken,
    /// Refresh cookie present but expired or badly signed
    RefreshTokenInvalid,
    /// Failed access token claims a different user than the refresh token
    SubjectMismatch,
    /// Refresh token subject no longer resolves to a user
    UserVanished,
}

impl UnauthorizedReason {
    /// Whether the refresh cookie must be cleared alongside the rejection.
    pub fn clears_refresh_cookie(self) -> bool {
        matches!(
            self,
            Self::RefreshTokenInvalid | Self::SubjectMismatch | Self::UserVanished
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoToken => "no token provided",
            Self::MissingRefreshToken => "access token rejected and no refresh token",
            Self::RefreshTokenInvalid => "refresh token invalid or expired",
            Self::SubjectMismatch => "token mismatch",
            Self::UserVanished => "invalid refresh token",
        }
    }
}

/// Field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failures surfaced by the session layer.
#[derive(Debug)]
pub enum SessionError {
    Validation(Vec<FieldError>),
    UserAlreadyExists,
    LoginFailed,
    Unauthorized(UnauthorizedReason),
    UserNotFound,
    Internal(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Validation(errors) => {
                write!(f, "Validation failed ({} errors)", errors.len())
            }
            SessionError::UserAlreadyExists => write!(f, "User already exists"),
            SessionError::LoginFailed => write!(f, "Email or password is incorrect"),
            SessionError::Unauthorized(reason) => write!(f, "Unauthorized: {}", reason.as_str()),
            SessionError::UserNotFound => write!(f, "User not found"),
            SessionError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

fn internal(context: &str, e: impl std::fmt::Display) -> SessionError {
    error!(error = %e, "{}", context);
    SessionError::Internal(context.to_string())
}

/// Validated registration request.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub profile: ProfileFields,
}

/// Public projection returned by registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

/// Successful login. The refresh token belongs in a cookie, not the body.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub profile: UserProfile,
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

/// Identity behind a protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub user_id: String,
    /// Set when the access token was renewed from the refresh token
    pub renewed_access_token: Option<String>,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    jwt: Arc<JwtConfig>,
}

impl SessionService {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: Arc<JwtConfig>) -> Self {
        Self { store, jwt }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub async fn register(&self, input: RegisterInput) -> Result<RegisteredUser, SessionError> {
        if input.password != input.confirm_password {
            return Err(SessionError::Validation(vec![FieldError::new(
                "confirmPassword",
                "Confirm password must match password",
            )]));
        }

        let password_hash = password::hash_password(&input.password)
            .await
            .map_err(|e| internal("Failed to hash password", e))?;

        let existing = self
            .store
            .find_by_email(&input.email)
            .await
            .map_err(|e| internal("Failed to look up user", e))?;
        if existing.is_some() {
            return Err(SessionError::UserAlreadyExists);
        }

        let user = self
            .store
            .create(NewUser {
                email: input.email,
                password_hash,
                profile: input.profile,
            })
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => SessionError::UserAlreadyExists,
                other => internal("Failed to create user", other),
            })?;

        info!(user_id = %user.id, "User registered");

        Ok(RegisteredUser {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        let user = self
            .store
            .find_by_email(email)
            .await
            .map_err(|e| internal("Failed to look up user", e))?
            .ok_or(SessionError::LoginFailed)?;

        let matches = self
            .store
            .verify_password(password, &user.password_hash)
            .await
            .map_err(|e| internal("Failed to verify password", e))?;
        if !matches {
            debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(SessionError::LoginFailed);
        }

        let access_token = self
            .jwt
            .generate_access_token(&user.id)
            .map_err(|e| internal("Failed to generate access token", e))?;
        let refresh_token = self
            .jwt
            .generate_refresh_token(&user.id)
            .map_err(|e| internal("Failed to generate refresh token", e))?;

        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            profile: user.into(),
            access_token,
            refresh_token,
        })
    }

    pub async fn resolve_session(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<ResolvedSession, SessionError> {
        let Some(access_token) = access_token else {
            return Err(reject(UnauthorizedReason::NoToken));
        };

        let verify_error = match self.jwt.validate_access_token(access_token) {
            Ok(claims) => {
                return Ok(ResolvedSession {
                    user_id: claims.sub,
                    renewed_access_token: None,
                });
            }
            Err(e) => e,
        };

        // Only ever compared against the verified refresh subject below.
        let expired_subject = self
            .jwt
            .decode_unverified(access_token)
            .ok()
            .map(|claims| claims.sub);

        let refresh_token = refresh_token.ok_or_else(|| {
            debug!(error = %verify_error, "Access token rejected");
            reject(UnauthorizedReason::MissingRefreshToken)
        })?;

        let refresh_claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|e| {
                debug!(error = %e, "Refresh token rejected");
                reject(UnauthorizedReason::RefreshTokenInvalid)
            })?;

        if let Some(expired_subject) = expired_subject {
            if expired_subject != refresh_claims.sub {
                warn!(
                    access_subject = %expired_subject,
                    refresh_subject = %refresh_claims.sub,
                    "Access and refresh token subjects differ"
                );
                return Err(reject(UnauthorizedReason::SubjectMismatch));
            }
        }

        let user = self
            .store
            .find_by_id(&refresh_claims.sub)
            .await
            .map_err(|e| internal("Failed to get user", e))?
            .ok_or_else(|| reject(UnauthorizedReason::UserVanished))?;

        let renewed = self
            .jwt
            .generate_access_token(&user.id)
            .map_err(|e| internal("Failed to generate access token", e))?;

        debug!(user_id = %user.id, "Access token renewed");

        Ok(ResolvedSession {
            user_id: user.id,
            renewed_access_token: Some(renewed.token),
        })
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile, SessionError> {
        self.store
            .find_by_id(user_id)
            .await
            .map_err(|e| internal("Failed to get user", e))?
            .map(UserProfile::from)
            .ok_or(SessionError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        fields: &ProfileFields,
    ) -> Result<UserProfile, SessionError> {
        self.store
            .update_profile(user_id, fields)
            .await
            .map_err(|e| internal("Failed to update profile", e))?
            .map(UserProfile::from)
            .ok_or(SessionError::UserNotFound)
    }
}

fn reject(reason: UnauthorizedReason) -> SessionError {
    if reason != UnauthorizedReason::SubjectMismatch {
        debug!(reason = reason.as_str(), "Session rejected");
    }
    SessionError::Unauthorized(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::User;
    use crate::db::Database;
    use crate::jwt::{Clock, FixedClock, TokenPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ACCESS: &[u8] = b"test-access-secret-key-for-testing";
    const REFRESH: &[u8] = b"test-refresh-secret-key-for-testing";
    const NOW: u64 = 1_700_000_000;

    /// Wraps the SQLite store and counts id lookups.
    struct CountingStore {
        inner: crate::db::UserStore,
        id_lookups: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for CountingStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.id_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }

        async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
            self.inner.create(new_user).await
        }

        async fn update_profile(
            &self,
            id: &str,
            fields: &ProfileFields,
        ) -> Result<Option<User>, StoreError> {
            self.inner.update_profile(id, fields).await
        }
    }

    struct Harness {
        service: SessionService,
        store: Arc<CountingStore>,
        clock: Arc<FixedClock>,
    }

    impl Harness {
        fn id_lookups(&self) -> usize {
            self.store.id_lookups.load(Ordering::SeqCst)
        }

        /// Mint an access token the way a stale client would hold it.
        fn stale_access_token(&self, user_id: &str) -> String {
            let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW - 3600));
            JwtConfig::with_clock(ACCESS, REFRESH, TokenPolicy::default(), clock)
                .generate_access_token(user_id)
                .unwrap()
                .token
        }

        fn refresh_token(&self, user_id: &str) -> String {
            self.service
                .jwt()
                .generate_refresh_token(user_id)
                .unwrap()
                .token
        }
    }

    async fn harness() -> Harness {
        let db = Database::open(":memory:").await.unwrap();
        let store = Arc::new(CountingStore {
            inner: db.users(),
            id_lookups: AtomicUsize::new(0),
        });
        let clock = Arc::new(FixedClock::new(NOW));
        let jwt = Arc::new(JwtConfig::with_clock(
            ACCESS,
            REFRESH,
            TokenPolicy::default(),
            clock.clone(),
        ));
        Harness {
            service: SessionService::new(store.clone(), jwt),
            store,
            clock,
        }
    }

    fn register_input(email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
            profile: ProfileFields::default(),
        }
    }

    async fn registered(h: &Harness, email: &str) -> RegisteredUser {
        h.service
            .register(register_input(email, "hunter22"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login_issues_tokens_for_user() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        assert_eq!(user.email, "alice@example.com");

        let outcome = h.service.login("alice@example.com", "hunter22").await.unwrap();
        assert_eq!(outcome.profile.id, user.id);

        let access = h
            .service
            .jwt()
            .validate_access_token(&outcome.access_token.token)
            .unwrap();
        let refresh = h
            .service
            .jwt()
            .validate_refresh_token(&outcome.refresh_token.token)
            .unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(refresh.sub, user.id);
        assert_eq!(outcome.access_token.duration, 5 * 60);
        assert_eq!(outcome.refresh_token.duration, 30 * 60);
    }

    #[tokio::test]
    async fn test_register_rejects_mismatched_confirmation() {
        let h = harness().await;
        let mut input = register_input("alice@example.com", "hunter22");
        input.confirm_password = "hunter23".to_string();

        let result = h.service.register(input).await;
        assert!(matches!(result, Err(SessionError::Validation(ref e)) if e[0].field == "confirmPassword"));
    }

    #[tokio::test]
    async fn test_register_same_email_twice() {
        let h = harness().await;
        registered(&h, "alice@example.com").await;

        let result = h
            .service
            .register(register_input("alice@example.com", "other-password"))
            .await;
        assert!(matches!(result, Err(SessionError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_concurrent_registration_has_one_winner() {
        let h = harness().await;

        let (a, b) = tokio::join!(
            h.service
                .register(register_input("race@example.com", "hunter22")),
            h.service
                .register(register_input("race@example.com", "hunter33")),
        );

        let results = [a, b];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(SessionError::UserAlreadyExists)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness().await;
        registered(&h, "alice@example.com").await;

        let wrong_password = h
            .service
            .login("alice@example.com", "wrong-password")
            .await
            .unwrap_err();
        let unknown_email = h
            .service
            .login("bob@example.com", "hunter22")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, SessionError::LoginFailed));
        assert!(matches!(unknown_email, SessionError::LoginFailed));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_resolve_without_token_skips_refresh() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        let refresh = h.refresh_token(&user.id);

        let result = h.service.resolve_session(None, Some(&refresh)).await;

        assert!(matches!(
            result,
            Err(SessionError::Unauthorized(UnauthorizedReason::NoToken))
        ));
        assert_eq!(h.id_lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolve_valid_token_does_not_touch_store() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        let outcome = h.service.login("alice@example.com", "hunter22").await.unwrap();

        let session = h
            .service
            .resolve_session(
                Some(&outcome.access_token.token),
                Some(&outcome.refresh_token.token),
            )
            .await
            .unwrap();

        assert_eq!(
            session,
            ResolvedSession {
                user_id: user.id,
                renewed_access_token: None,
            }
        );
        assert_eq!(h.id_lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolve_expired_token_renews_for_same_subject() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        let outcome = h.service.login("alice@example.com", "hunter22").await.unwrap();

        h.clock.advance(Duration::from_secs(6 * 60));

        let session = h
            .service
            .resolve_session(
                Some(&outcome.access_token.token),
                Some(&outcome.refresh_token.token),
            )
            .await
            .unwrap();

        assert_eq!(session.user_id, user.id);
        let renewed = session.renewed_access_token.unwrap();
        let claims = h.service.jwt().validate_access_token(&renewed).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.iat, NOW + 6 * 60);
        assert_eq!(h.id_lookups(), 1);
    }

    #[tokio::test]
    async fn test_resolve_rejects_subject_mismatch() {
        let h = harness().await;
        let alice = registered(&h, "alice@example.com").await;
        let bob = registered(&h, "bob@example.com").await;

        let result = h
            .service
            .resolve_session(
                Some(&h.stale_access_token(&alice.id)),
                Some(&h.refresh_token(&bob.id)),
            )
            .await;

        match result {
            Err(SessionError::Unauthorized(reason)) => {
                assert_eq!(reason, UnauthorizedReason::SubjectMismatch);
                assert!(reason.clears_refresh_cookie());
            }
            other => panic!("expected subject mismatch, got {:?}", other),
        }
        assert_eq!(h.id_lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolve_undecodable_token_still_renews() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;

        let session = h
            .service
            .resolve_session(Some("garbage"), Some(&h.refresh_token(&user.id)))
            .await
            .unwrap();

        assert_eq!(session.user_id, user.id);
        assert!(session.renewed_access_token.is_some());
    }

    #[tokio::test]
    async fn test_resolve_expired_token_without_refresh_cookie() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;

        let result = h
            .service
            .resolve_session(Some(&h.stale_access_token(&user.id)), None)
            .await;

        match result {
            Err(SessionError::Unauthorized(reason)) => {
                assert_eq!(reason, UnauthorizedReason::MissingRefreshToken);
                assert!(!reason.clears_refresh_cookie());
            }
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_expired_refresh_token() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        let outcome = h.service.login("alice@example.com", "hunter22").await.unwrap();
        assert_eq!(outcome.profile.id, user.id);

        h.clock.advance(Duration::from_secs(31 * 60));

        let result = h
            .service
            .resolve_session(
                Some(&outcome.access_token.token),
                Some(&outcome.refresh_token.token),
            )
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Unauthorized(
                UnauthorizedReason::RefreshTokenInvalid
            ))
        ));
    }

    #[tokio::test]
    async fn test_resolve_access_token_in_refresh_slot_is_rejected() {
        let h = harness().await;
        let user = registered(&h, "alice@example.com").await;
        let stale = h.stale_access_token(&user.id);

        let result = h.service.resolve_session(Some(&stale), Some(&stale)).await;
        assert!(matches!(
            result,
            Err(SessionError::Unauthorized(
                UnauthorizedReason::RefreshTokenInvalid
            ))
        ));
    }

    #[tokio::test]
    async fn test_resolve_refresh_for_vanished_user() {
        let h = harness().await;

        let result = h
            .service
            .resolve_session(
                Some(&h.stale_access_token("ghost")),
                Some(&h.refresh_token("ghost")),
            )
            .await;
        assert!(matches!(
            result,
            Err(SessionError::Unauthorized(UnauthorizedReason::UserVanished))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_unspecified_fields() {
        let h = harness().await;
        let mut input = register_input("alice@example.com", "hunter22");
        input.profile = ProfileFields {
            name: Some("A".to_string()),
            birth_date: None,
            address: Some("B".to_string()),
        };
        let user = h.service.register(input).await.unwrap();

        let updated = h
            .service
            .update_profile(
                &user.id,
                &ProfileFields {
                    address: Some("C".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("A"));
        assert_eq!(updated.address.as_deref(), Some("C"));
        assert_eq!(updated.birth_date, None);
    }

    #[tokio::test]
    async fn test_profile_of_unknown_user() {
        let h = harness().await;

        assert!(matches!(
            h.service.get_profile("missing").await,
            Err(SessionError::UserNotFound)
        ));
        assert!(matches!(
            h.service
                .update_profile("missing", &ProfileFields::default())
                .await,
            Err(SessionError::UserNotFound)
        ));
    }

    /// Store whose backend is down. Lookups fail only when `fail_lookups` is set,
    /// so registration reaches the insert.
    struct BrokenStore {
        fail_lookups: bool,
    }

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            if self.fail_lookups {
                return Err(StoreError::Backend("connection reset".into()));
            }
            Ok(None)
        }

        async fn find_by_id(&self, _id: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }

        async fn create(&self, _new_user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::Backend("disk I/O error".into()))
        }

        async fn update_profile(
            &self,
            _id: &str,
            _fields: &ProfileFields,
        ) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend("disk I/O error".into()))
        }
    }

    fn broken_service(fail_lookups: bool) -> SessionService {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(NOW));
        SessionService::new(
            Arc::new(BrokenStore { fail_lookups }),
            Arc::new(JwtConfig::with_clock(
                ACCESS,
                REFRESH,
                TokenPolicy::default(),
                clock,
            )),
        )
    }

    #[tokio::test]
    async fn test_register_insert_failure_is_internal_not_conflict() {
        let service = broken_service(false);

        let result = service
            .register(register_input("alice@example.com", "hunter22"))
            .await;
        assert!(matches!(result, Err(SessionError::Internal(_))));
    }

    #[tokio::test]
    async fn test_store_lookup_failures_are_internal() {
        let service = broken_service(true);

        assert!(matches!(
            service
                .register(register_input("alice@example.com", "hunter22"))
                .await,
            Err(SessionError::Internal(_))
        ));
        assert!(matches!(
            service.login("alice@example.com", "hunter22").await,
            Err(SessionError::Internal(_))
        ));
        assert!(matches!(
            service.get_profile("some-id").await,
            Err(SessionError::Internal(_))
        ));
    }
}
