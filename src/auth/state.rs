//! Authentication state trait.

use super::cookie::CookieSettings;
use crate::session::SessionService;

/// Trait for state types that can resolve sessions for the `ApiAuth` extractor.
pub trait HasSessionBackend {
    fn sessions(&self) -> &SessionService;
    fn cookies(&self) -> &CookieSettings;
}
