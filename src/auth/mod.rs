//! Bearer-token authentication with silent renewal.
//!
//! Dual-token system: short-lived access tokens (5 min by default) travel in the
//! Authorization header and are held by the client; refresh tokens (30 min by default)
//! live in an HTTP-only cookie. Both are stateless. When the access token no
//! longer verifies, the extractor renews it from the refresh cookie.

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{CookieSettings, REFRESH_COOKIE_NAME, get_bearer_token, get_cookie};
pub use errors::ApiAuthError;
pub use extractors::ApiAuth;
pub use state::HasSessionBackend;
