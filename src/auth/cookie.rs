//! Cookie and header parsing utilities for authentication.

use axum::http::{HeaderMap, header};

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Attributes shared by every refresh cookie the server sets or clears.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Add the Secure flag (HTTPS deployments)
    pub secure: bool,
    /// Cookie path, the API root
    pub path: String,
}

impl CookieSettings {
    /// `Set-Cookie` value carrying a refresh token.
    pub fn refresh_cookie(&self, token: &str, max_age_secs: u64) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
            REFRESH_COOKIE_NAME,
            token,
            self.path,
            max_age_secs,
            self.secure_suffix()
        )
    }

    /// `Set-Cookie` value that removes the refresh token.
    pub fn clear_refresh_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0{}",
            REFRESH_COOKIE_NAME,
            self.path,
            self.secure_suffix()
        )
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Extract the token from `Authorization: Bearer <token>`.
/// Any other scheme, or an empty token, counts as no token.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
