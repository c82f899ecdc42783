//! Bearer-token extractors.
//!
//! Shoppers and admins authenticate with `Authorization: Bearer <token>`.
//! The token is hashed and looked up on every request; there is no session
//! state in the process.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use ryangel_core::Email;

use crate::error::{AppError, set_sentry_user};
use crate::models::{Admin, Client};
use crate::services::auth::TokenService;
use crate::state::AppState;

/// Pull the raw token out of the `Authorization` header.
///
/// Returns `Ok(None)` when the header is absent. A header that is present
/// but not a well-formed bearer credential is rejected.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed authorization header".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("expected a bearer token".to_string()))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::Unauthorized("expected a bearer token".to_string()));
    }
    Ok(Some(token))
}

fn tokens(state: &AppState) -> TokenService<'_> {
    TokenService::new(state.pool(), state.config().token_ttl)
}

/// Extractor that requires an authenticated shopper.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireClient(client): RequireClient) -> Json<Client> {
///     Json(client)
/// }
/// ```
pub struct RequireClient(pub Client);

impl FromRequestParts<AppState> for RequireClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
        let client = tokens(state).validate_client(token).await?;
        set_sentry_user(&client.id, client.email.as_ref().map(Email::as_str));
        Ok(Self(client))
    }
}

/// Extractor that identifies the shopper when a token is presented.
///
/// No `Authorization` header means an anonymous caller. A token that is
/// presented but invalid or expired is still rejected, so a client with a
/// stale token learns to sign in again.
pub struct OptionalClient(pub Option<Client>);

impl FromRequestParts<AppState> for OptionalClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts)? else {
            return Ok(Self(None));
        };
        let client = tokens(state).validate_client(token).await?;
        set_sentry_user(&client.id, client.email.as_ref().map(Email::as_str));
        Ok(Self(Some(client)))
    }
}

/// Extractor that requires an authenticated admin.
pub struct RequireAdmin(pub Admin);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
        let admin = tokens(state).validate_admin(token).await?;
        set_sentry_user(&format!("admin:{}", admin.id), Some(admin.email.as_str()));
        Ok(Self(admin))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_absent() {
        assert!(bearer_token(&parts_with(None)).unwrap().is_none());
    }

    #[test]
    fn test_bearer_token_present() {
        let parts = parts_with(Some("Bearer abc123"));
        assert_eq!(bearer_token(&parts).unwrap(), Some("abc123"));

        let parts = parts_with(Some("bearer  padded "));
        assert_eq!(bearer_token(&parts).unwrap(), Some("padded"));
    }

    #[test]
    fn test_bearer_token_malformed() {
        for header in ["Bearer", "Bearer ", "Basic dXNlcjpwYXNz", "abc123"] {
            assert!(
                matches!(bearer_token(&parts_with(Some(header))), Err(AppError::Unauthorized(_))),
                "{header:?} should be rejected"
            );
        }
    }
}
