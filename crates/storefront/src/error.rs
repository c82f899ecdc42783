//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Service errors convert into
//! `AppError`, which picks the HTTP status and a stable machine-readable code
//! and renders `{"error": {"code": "...", "message": "..."}}`. Server-side
//! failures are captured to Sentry before responding, and their details never
//! reach the client.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::orders::OrderError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication or account operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or unusable credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

const INTERNAL: (StatusCode, &str) = (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR");

fn auth_parts(err: &AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_CREDENTIALS"),
        AuthError::InactiveAccount => (StatusCode::FORBIDDEN, "AUTH_INACTIVE_ACCOUNT"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_TOKEN"),
        AuthError::InvalidOtp => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_OTP"),
        AuthError::PhoneNotFound => (StatusCode::NOT_FOUND, "AUTH_PHONE_NOT_FOUND"),
        AuthError::DuplicateIdentifier => (StatusCode::CONFLICT, "AUTH_DUPLICATE_IDENTIFIER"),
        AuthError::InvalidPhone(_)
        | AuthError::InvalidEmail(_)
        | AuthError::MissingField(_)
        | AuthError::WeakPassword(_)
        | AuthError::InvalidUsername(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        AuthError::ProviderNotConfigured => (StatusCode::NOT_FOUND, "AUTH_PROVIDER_UNAVAILABLE"),
        AuthError::IdentityProvider(_) => (StatusCode::BAD_GATEWAY, "AUTH_PROVIDER_ERROR"),
        AuthError::Cart(inner) => cart_parts(inner),
        AuthError::Repository(inner) => repository_parts(inner),
        AuthError::PasswordHash => INTERNAL,
    }
}

fn cart_parts(err: &CartError) -> (StatusCode, &'static str) {
    match err {
        CartError::UnauthorizedCartAccess => (StatusCode::FORBIDDEN, "CART_FORBIDDEN"),
        CartError::ItemNotFound => (StatusCode::NOT_FOUND, "CART_ITEM_NOT_FOUND"),
        CartError::ProductNotFound => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
        CartError::InvalidQuantity => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CartError::InvalidDiscountCode => (StatusCode::BAD_REQUEST, "CART_INVALID_DISCOUNT_CODE"),
        CartError::Repository(inner) => repository_parts(inner),
    }
}

fn checkout_parts(err: &CheckoutError) -> (StatusCode, &'static str) {
    match err {
        CheckoutError::CartNotFound => (StatusCode::NOT_FOUND, "CART_NOT_FOUND"),
        CheckoutError::UnauthorizedCartAccess => (StatusCode::FORBIDDEN, "CART_FORBIDDEN"),
        CheckoutError::EmptyCart => (StatusCode::BAD_REQUEST, "CART_EMPTY"),
        CheckoutError::InvalidPickupStore => {
            (StatusCode::BAD_REQUEST, "CHECKOUT_INVALID_PICKUP_STORE")
        }
        CheckoutError::InvalidEmail(_) | CheckoutError::InvalidPhone(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        CheckoutError::OrderNumberExhausted => INTERNAL,
        CheckoutError::Repository(inner) => repository_parts(inner),
    }
}

fn order_parts(err: &OrderError) -> (StatusCode, &'static str) {
    match err {
        OrderError::NotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        OrderError::Repository(inner) => repository_parts(inner),
    }
}

fn repository_parts(err: &RepositoryError) -> (StatusCode, &'static str) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => INTERNAL,
    }
}

impl AppError {
    /// HTTP status and stable error code for this error.
    #[must_use]
    pub fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Auth(err) => auth_parts(err),
            Self::Cart(err) => cart_parts(err),
            Self::Checkout(err) => checkout_parts(err),
            Self::Order(err) => order_parts(err),
            Self::Database(err) => repository_parts(err),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_TOKEN"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Internal(_) => INTERNAL,
        }
    }

    /// Client-facing message. Server and upstream failures stay generic.
    fn client_message(&self, status: StatusCode) -> String {
        if status.is_server_error() {
            return if status == StatusCode::BAD_GATEWAY {
                "External service error".to_string()
            } else {
                "Internal server error".to_string()
            };
        }
        match self {
            Self::Auth(err) => err.to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::Database(RepositoryError::Conflict(_)) => "Resource already exists".to_string(),
            Self::Database(err) => err.to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg) | Self::BadRequest(msg) | Self::Internal(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.client_message(status),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Item added", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    async fn body_of(err: impl Into<AppError>) -> serde_json::Value {
        let response = err.into().into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product".to_string());
        assert_eq!(err.to_string(), "Not found: product");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_auth_error_statuses() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::InactiveAccount), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AuthError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::InvalidOtp), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::PhoneNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AuthError::DuplicateIdentifier), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AuthError::WeakPassword("short".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::IdentityProvider(
                crate::services::oauth::OAuthError::MissingSubject
            )),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_cart_and_checkout_statuses() {
        assert_eq!(status_of(CheckoutError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CheckoutError::CartNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CheckoutError::UnauthorizedCartAccess),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CartError::UnauthorizedCartAccess),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(CartError::ItemNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CartError::InvalidDiscountCode),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::Cart(CartError::UnauthorizedCartAccess)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(OrderError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_generic_statuses() {
        assert_eq!(
            status_of(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_of(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(RepositoryError::DataCorruption("bad row".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let body = body_of(CheckoutError::EmptyCart).await;
        assert_eq!(body["error"]["code"], "CART_EMPTY");
        assert_eq!(body["error"]["message"], "cart is empty");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let body = body_of(RepositoryError::DataCorruption("secret column".into())).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
