//! Session middleware configuration.
//!
//! Only the Google sign-in round trip uses a session; every other route is
//! authenticated by bearer token. Sessions live in memory for ten minutes,
//! long enough to come back from the consent page.

use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "ryangel_oauth";

/// Session expiry time in seconds.
const SESSION_EXPIRY_SECONDS: i64 = 10 * 60;

/// Create the session layer for the sign-in routes.
///
/// `secure` marks the cookie `Secure`; pass `true` when the callback URL is
/// served over HTTPS.
#[must_use]
pub fn create_session_layer(secure: bool) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/api/auth/google")
}
