//! Google sign-in route handlers.
//!
//! - Login: stores a random state (and the shopper's anonymous cart, if any)
//!   in the session and redirects to the consent page.
//! - Callback: checks the state, exchanges the code, signs the shopper in,
//!   and redirects to the frontend with the token and cart id. Failures
//!   redirect to the frontend login page with an `error` reason.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rand::Rng;
use serde::Deserialize;
use tower_sessions::Session;
use url::form_urlencoded;

use ryangel_core::CartId;

use crate::error::Result;
use crate::models::session::keys;
use crate::services::auth::{AuthError, AuthService, ShopperSession};
use crate::state::AppState;

const STATE_LEN: usize = 32;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub cart_id: Option<String>,
}

/// Query parameters from the provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set when the user declined or the provider failed.
    pub error: Option<String>,
}

/// Generate a cryptographically secure random state string.
fn generate_state() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..STATE_LEN)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|&b| char::from(b))
        .collect()
}

fn frontend_redirect(base: &str, path: &str, pairs: &[(&str, &str)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
    format!("{base}{path}?{}", query.finish())
}

/// Redirect to the provider's consent page.
///
/// # Route
///
/// `GET /api/auth/google/login?cart_id=<uuid>`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let provider = state
        .identity_provider()
        .ok_or(AuthError::ProviderNotConfigured)?;
    let session_error = || {
        Redirect::to(&frontend_redirect(
            &state.config().frontend_url,
            "/login",
            &[("error", "session")],
        ))
        .into_response()
    };

    let oauth_state = generate_state();
    if let Err(e) = session.insert(keys::GOOGLE_OAUTH_STATE, &oauth_state).await {
        tracing::error!("Failed to store OAuth state in session: {}", e);
        return Ok(session_error());
    }

    match query.cart_id.as_deref().map(CartId::parse) {
        Some(Ok(cart_id)) => {
            if let Err(e) = session.insert(keys::GOOGLE_OAUTH_CART, cart_id).await {
                tracing::error!("Failed to store cart in session: {}", e);
                return Ok(session_error());
            }
        }
        Some(Err(_)) => tracing::warn!("Ignoring malformed cart_id on Google login"),
        None => {}
    }

    Ok(Redirect::to(&provider.authorization_url(&oauth_state)).into_response())
}

/// Finish sign-in and hand the session to the frontend.
///
/// # Route
///
/// `GET /api/auth/google/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Response {
    // one-time use
    let expected_state: Option<String> = session
        .remove(keys::GOOGLE_OAUTH_STATE)
        .await
        .ok()
        .flatten();
    let cart: Option<CartId> = session
        .remove(keys::GOOGLE_OAUTH_CART)
        .await
        .ok()
        .flatten();
    let frontend = state.config().frontend_url.as_str();

    let target = match complete_sign_in(&state, expected_state.as_deref(), cart, query).await {
        Ok(session) => {
            tracing::info!(client_id = %session.client.id, "Google sign-in complete");
            frontend_redirect(
                frontend,
                "/google-callback",
                &[
                    ("token", &session.token.token),
                    ("cart_id", &session.cart_id.to_string()),
                ],
            )
        }
        Err(reason) => frontend_redirect(frontend, "/login", &[("error", reason)]),
    };

    Redirect::to(&target).into_response()
}

/// Run the callback checks; `Err` holds the reason shown to the frontend.
async fn complete_sign_in(
    state: &AppState,
    expected_state: Option<&str>,
    cart: Option<CartId>,
    query: CallbackQuery,
) -> std::result::Result<ShopperSession, &'static str> {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Google sign-in declined");
        return Err("google_denied");
    }
    let Some(code) = query.code else {
        tracing::warn!("Google callback missing code");
        return Err("missing_code");
    };
    match (query.state.as_deref(), expected_state) {
        (Some(returned), Some(expected)) if returned == expected => {}
        _ => {
            tracing::warn!("Google OAuth state mismatch");
            return Err("invalid_state");
        }
    }

    let Some(provider) = state.identity_provider() else {
        return Err("not_configured");
    };
    let identity = provider.exchange_code(&code).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to exchange Google authorization code");
        "token_exchange"
    })?;

    let config = state.config();
    AuthService::new(
        state.pool(),
        state.sms(),
        config.token_ttl,
        config.shipping_fee,
    )
    .login_with_identity(&identity, cart)
    .await
    .map_err(|e| match e {
        AuthError::InactiveAccount => "inactive_account",
        other => {
            tracing::error!(error = %other, "Google sign-in failed");
            "login_failed"
        }
    })
}
