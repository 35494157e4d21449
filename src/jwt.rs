//! JWT token generation and validation.
//!
//! Access and refresh tokens are both stateless HS256 JWTs carrying only the
//! subject and timestamps. They are signed with two independent secrets, so a
//! token of one kind never verifies as the other.

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Access token duration: 5 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 5 * 60;

/// Refresh token duration: 30 minutes
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock pinned to a settable instant. Used to mint and check tokens at a
/// chosen point in time.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// HMAC secret usable for both signing and verification.
#[derive(Clone)]
pub struct SigningKey {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

/// What an unverified token claims. Only the subject is read, so a payload
/// with missing or odd timestamps still yields it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnverifiedClaims {
    pub sub: String,
}

/// Result of signing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum TokenError {
    /// Signature checked out but the token is past its expiry
    Expired,
    /// Signature mismatch, wrong key, or anything that does not parse as a JWT
    BadSignature,
    /// Payload could not be decoded at all
    Malformed,
    /// Lifetime too long to express as an expiry timestamp
    ExpiryOverflow,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::BadSignature => write!(f, "Invalid token signature"),
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::ExpiryOverflow => write!(f, "Token lifetime overflows the expiry"),
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
        }
    }
}

impl std::error::Error for TokenError {}

/// Signs, verifies and inspects tokens against an injected clock.
#[derive(Clone)]
pub struct TokenCodec {
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign a token for `subject` that expires `ttl` from now.
    pub fn sign(
        &self,
        subject: &str,
        key: &SigningKey,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let duration = ttl.as_secs();
        let exp = now
            .checked_add(duration)
            .ok_or(TokenError::ExpiryOverflow)?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &key.encoding_key,
        )
        .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: claims.exp,
            duration,
        })
    }

    /// Check the signature, then the expiry.
    pub fn verify(&self, token: &str, key: &SigningKey) -> Result<Claims, TokenError> {
        // Expiry is checked below against our own clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = jsonwebtoken::decode::<Claims>(token, &key.decoding_key, &validation)
            .map_err(|_| TokenError::BadSignature)?;

        if token_data.claims.exp <= self.clock.now() {
            return Err(TokenError::Expired);
        }

        Ok(token_data.claims)
    }

    /// Read the claims without checking the signature or expiry.
    ///
    /// The output is attacker-controlled. It is only fit for comparing against
    /// claims that were verified some other way, never for granting access.
    pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, TokenError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;

        serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh_ttl: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_key: SigningKey,
    refresh_key: SigningKey,
    policy: TokenPolicy,
    codec: TokenCodec,
}

impl JwtConfig {
    /// Create a new JWT configuration backed by the system clock.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], policy: TokenPolicy) -> Self {
        Self::with_clock(
            access_secret,
            refresh_secret,
            policy,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        access_secret: &[u8],
        refresh_secret: &[u8],
        policy: TokenPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access_key: SigningKey::new(access_secret),
            refresh_key: SigningKey::new(refresh_secret),
            policy,
            codec: TokenCodec::new(clock),
        }
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, user_id: &str) -> Result<IssuedToken, TokenError> {
        self.codec
            .sign(user_id, &self.access_key, self.policy.access_ttl)
    }

    /// Generate a refresh token for a user.
    pub fn generate_refresh_token(&self, user_id: &str) -> Result<IssuedToken, TokenError> {
        self.codec
            .sign(user_id, &self.refresh_key, self.policy.refresh_ttl)
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.verify(token, &self.access_key)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.verify(token, &self.refresh_key)
    }

    /// Recover the claimed subject of an access token without trusting it.
    pub fn decode_unverified(&self, token: &str) -> Result<UnverifiedClaims, TokenError> {
        TokenCodec::decode_unverified(token)
    }
}
