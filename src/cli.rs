//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS, TokenPolicy};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Longest accepted token lifetime, about 136 years.
pub const MAX_TOKEN_TTL_SECS: u64 = u32::MAX as u64;

pub const ACCESS_SECRET_ENV: &str = "JWT_SECRET";
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";
pub const API_KEY_ENV: &str = "API_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "keystile",
    about = "Account service with email/password login and rolling JWT sessions"
)]
pub struct Args {
    /// API root path, empty to serve at the root
    #[arg(short, long, default_value = "/api/v1", value_parser = validate_base_path)]
    pub base: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9999")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "accounts.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the JWT_SECRET env var
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the JWT_REFRESH_SECRET env var
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS))]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECS))]
    pub refresh_token_ttl: u64,

    /// Set the Secure flag on the refresh cookie (enable behind HTTPS)
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// `/` alone is treated as the root.
pub fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() || s == "/" {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env = %env_var,
            "Signing secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.chars().count() < MIN_JWT_SECRET_LENGTH {
        error!(
            env = %env_var,
            "Secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets and make sure they differ.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, args.jwt_secret_file.as_deref())?;
    let refresh = load_secret(REFRESH_SECRET_ENV, args.jwt_refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some((access, refresh))
}

/// Read the API key from the environment.
pub fn load_api_key() -> Option<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            // SAFETY: see load_secret.
            unsafe { std::env::remove_var(API_KEY_ENV) };
            Some(key.trim().to_string())
        }
        _ => {
            error!("API key is required. Set the API_KEY environment variable");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
    api_key: String,
) -> ServerConfig {
    ServerConfig {
        base: args.base.clone(),
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        token_policy: TokenPolicy {
            access_ttl: Duration::from_secs(args.access_token_ttl),
            refresh_ttl: Duration::from_secs(args.refresh_token_ttl),
        },
        api_key,
        secure_cookies: args.secure_cookies,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
