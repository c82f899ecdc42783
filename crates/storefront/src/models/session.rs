//! Session-related types.

/// Session keys for the Google sign-in round trip.
pub mod keys {
    /// Key for the OAuth state (CSRF protection).
    pub const GOOGLE_OAUTH_STATE: &str = "google_oauth_state";

    /// Key for the anonymous cart to claim once sign-in completes.
    pub const GOOGLE_OAUTH_CART: &str = "google_oauth_cart";
}
