//! User records and the storage contract the session layer depends on.

use async_trait::async_trait;
use serde::Serialize;

use crate::password::{self, PasswordError};

/// Stored user record.
#[derive(Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    /// ISO date, `YYYY-MM-DD`
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("name", &self.name)
            .field("birth_date", &self.birth_date)
            .field("address", &self.address)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            birth_date: user.birth_date,
            address: user.address,
            created_at: user.created_at,
        }
    }
}

/// Optional profile fields. `None` means "leave as is" on update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
}

/// Everything needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub profile: ProfileFields,
}

/// Storage failures.
#[derive(Debug)]
pub enum StoreError {
    /// The email is already registered
    AlreadyExists,
    /// Any other persistence or hashing failure
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::AlreadyExists => write!(f, "User already exists"),
            StoreError::Backend(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<PasswordError> for StoreError {
    fn from(e: PasswordError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// User lookup, creation and update by id or email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user. A duplicate email is `StoreError::AlreadyExists`, whether
    /// caught up front or by the unique constraint at insert time.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Apply the provided fields only. `Ok(None)` when the id does not resolve.
    async fn update_profile(
        &self,
        id: &str,
        fields: &ProfileFields,
    ) -> Result<Option<User>, StoreError>;

    /// One-way comparison of a plaintext password against a stored hash.
    async fn verify_password(&self, plain: &str, hash: &str) -> Result<bool, StoreError> {
        Ok(password::verify_password(plain, hash).await?)
    }
}
