//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::cart::CartError;
use crate::services::oauth::OAuthError;

/// Errors that can occur during authentication operations.
///
/// Lookup misses, wrong passwords, and accounts without a password all
/// collapse into `InvalidCredentials`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] ryangel_core::PhoneError),

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] ryangel_core::EmailError),

    /// Required form field missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Invalid credentials (wrong password or account not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    InactiveAccount,

    /// Bearer token unknown, expired, or revoked.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("invalid or expired verification code")]
    InvalidOtp,

    /// OTP login for a phone with no account.
    #[error("phone number not registered")]
    PhoneNotFound,

    /// Phone, username, or email already held by another account.
    #[error("account already exists")]
    DuplicateIdentifier,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("username validation failed: {0}")]
    InvalidUsername(String),

    /// Third-party sign-in requested but not configured.
    #[error("sign-in provider not configured")]
    ProviderNotConfigured,

    #[error("identity provider error: {0}")]
    IdentityProvider(#[from] OAuthError),

    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
