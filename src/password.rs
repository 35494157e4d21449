//! Password hashing.
//!
//! Argon2id with a random salt per hash, stored as a PHC string. Both hashing
//! and verification are CPU-bound, so the async wrappers run them on the
//! blocking pool instead of a runtime worker.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Errors from the hashing primitive.
#[derive(Debug)]
pub enum PasswordError {
    /// Argon2 refused to hash the input
    Hashing(String),
    /// The stored hash is not a valid PHC string
    InvalidHash,
    /// The blocking task panicked or was cancelled
    Task(String),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Hashing(e) => write!(f, "Failed to hash password: {}", e),
            PasswordError::InvalidHash => write!(f, "Stored password hash is invalid"),
            PasswordError::Task(e) => write!(f, "Password task failed: {}", e),
        }
    }
}

impl std::error::Error for PasswordError {}

/// Hash a password using argon2id.
pub fn hash_password_blocking(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a PHC hash. A well-formed hash that does not
/// match is `Ok(false)`.
pub fn verify_password_blocking(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password_blocking("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password_blocking("correct horse", &hash).unwrap());
        assert!(!verify_password_blocking("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let a = hash_password_blocking("password1").unwrap();
        let b = hash_password_blocking("password1").unwrap();

        assert_ne!(a, b);
        assert!(verify_password_blocking("password1", &a).unwrap());
        assert!(verify_password_blocking("password1", &b).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password_blocking("password", "not-a-valid-hash");
        assert!(matches!(result, Err(PasswordError::InvalidHash)));
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let hash = hash_password("secret123").await.unwrap();
        assert!(verify_password("secret123", &hash).await.unwrap());
        assert!(!verify_password("secret124", &hash).await.unwrap());
    }
}
