//! Authentication service.
//!
//! Shoppers sign in with a password, a one-time SMS code, or Google. Every
//! successful shopper sign-in ends the same way: a fresh bearer token is
//! issued (revoking the previous one) and the shopper's cart is settled,
//! claiming the anonymous cart the browser presented if there is one.
//! Admins sign in with a password only.

mod error;
pub mod token;

pub use error::AuthError;
pub use token::{IssuedToken, TokenService};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use ryangel_core::{AdminId, CartId, ClientId, Email, Phone};

use crate::db::RepositoryError;
use crate::db::clients::{ClientRepository, NewClient, ProfileUpdate};
use crate::db::AdminRepository;
use crate::models::{Admin, Client};
use crate::services::cart::CartService;
use crate::services::oauth::ExternalIdentity;
use crate::services::sms::{SmsSender, otp_message};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Username length bounds.
const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=30;

/// How long a one-time code stays valid.
pub const OTP_TTL_MINUTES: i64 = 5;

/// Result of a shopper sign-in.
#[derive(Debug, Serialize)]
pub struct ShopperSession {
    pub client: Client,
    #[serde(flatten)]
    pub token: IssuedToken,
    pub cart_id: CartId,
}

/// Result of an admin sign-in.
#[derive(Debug, Serialize)]
pub struct AdminSession {
    pub admin: Admin,
    #[serde(flatten)]
    pub token: IssuedToken,
}

/// Registration form.
#[derive(Debug)]
pub struct Registration<'r> {
    pub phone: &'r str,
    pub username: &'r str,
    pub email: Option<&'r str>,
    pub password: &'r str,
}

/// Profile fields a shopper submitted; `None` or blank leaves a field as is.
#[derive(Debug, Default)]
pub struct ProfileChanges<'r> {
    pub username: Option<&'r str>,
    pub email: Option<&'r str>,
    pub date_of_birth: Option<chrono::NaiveDate>,
}

/// Authentication service.
pub struct AuthService<'a> {
    clients: ClientRepository<'a>,
    admins: AdminRepository<'a>,
    tokens: TokenService<'a>,
    carts: CartService<'a>,
    sms: &'a dyn SmsSender,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        sms: &'a dyn SmsSender,
        token_ttl: Duration,
        shipping_fee: Decimal,
    ) -> Self {
        Self {
            clients: ClientRepository::new(pool),
            admins: AdminRepository::new(pool),
            tokens: TokenService::new(pool, token_ttl),
            carts: CartService::new(pool, shipping_fee),
            sms,
        }
    }

    // =========================================================================
    // Shopper registration and OTP
    // =========================================================================

    /// Register a shopper. The account stays inactive until its first OTP
    /// is verified.
    ///
    /// Registering again with the phone of a still-inactive account replaces
    /// that account's credentials.
    ///
    /// # Errors
    ///
    /// Returns a validation error (`InvalidPhone`, `InvalidEmail`,
    /// `InvalidUsername`, `WeakPassword`) for bad input.
    /// Returns `AuthError::DuplicateIdentifier` if an active account holds
    /// the phone or username, or another account holds the username or email.
    #[tracing::instrument(skip(self, form), fields(phone = %form.phone))]
    pub async fn register(&self, form: &Registration<'_>) -> Result<Client, AuthError> {
        let phone = Phone::parse(form.phone)?;
        let username = validate_username(form.username)?;
        let email = form
            .email
            .filter(|e| !e.trim().is_empty())
            .map(Email::parse)
            .transpose()?;
        validate_password(form.password)?;

        if self
            .clients
            .active_identifier_taken(&phone, username)
            .await?
        {
            return Err(AuthError::DuplicateIdentifier);
        }

        let password_hash = hash_password(form.password)?;
        let new = NewClient {
            phone: &phone,
            username,
            email: email.as_ref(),
            password_hash: &password_hash,
        };

        let client = match self.clients.get_by_phone(&phone).await? {
            Some(existing) if existing.is_active => return Err(AuthError::DuplicateIdentifier),
            Some(pending) => self.clients.refresh_pending(pending.id, &new).await,
            None => self.clients.create_pending(&new).await,
        }
        .map_err(duplicate_on_conflict)?;

        self.send_otp(&client, &phone).await?;
        tracing::info!(client_id = %client.id, "Shopper registered, awaiting verification");

        Ok(client)
    }

    /// Send a sign-in code to an active shopper.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PhoneNotFound` if no account has this phone.
    /// Returns `AuthError::InactiveAccount` if the account is not active.
    #[tracing::instrument(skip(self))]
    pub async fn request_otp(&self, phone: &str) -> Result<(), AuthError> {
        let phone = Phone::parse(phone)?;
        let client = self
            .clients
            .get_by_phone(&phone)
            .await?
            .ok_or(AuthError::PhoneNotFound)?;

        if !client.is_active {
            return Err(AuthError::InactiveAccount);
        }

        self.send_otp(&client, &phone).await
    }

    /// Send a new code. Unlike [`Self::request_otp`] this also serves
    /// accounts still waiting for their first verification.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PhoneNotFound` if no account has this phone.
    #[tracing::instrument(skip(self))]
    pub async fn resend_otp(&self, phone: &str) -> Result<(), AuthError> {
        let phone = Phone::parse(phone)?;
        let client = self
            .clients
            .get_by_phone(&phone)
            .await?
            .ok_or(AuthError::PhoneNotFound)?;

        self.send_otp(&client, &phone).await
    }

    /// Consume a code and sign the shopper in, activating a pending account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidOtp` if the code is wrong, used, or expired.
    #[tracing::instrument(skip(self, code))]
    pub async fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        cart: Option<CartId>,
    ) -> Result<ShopperSession, AuthError> {
        let phone = Phone::parse(phone)?;
        let client = self
            .clients
            .consume_otp(&phone, code.trim())
            .await?
            .ok_or(AuthError::InvalidOtp)?;

        self.start_session(client, cart).await
    }

    /// Store a fresh code and text it. Delivery failures are logged only;
    /// the shopper can ask for another code.
    async fn send_otp(&self, client: &Client, phone: &Phone) -> Result<(), AuthError> {
        let code = generate_otp();
        let expiry = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
        self.clients.set_otp(client.id, &code, expiry).await?;

        if let Err(e) = self
            .sms
            .send_sms(phone.as_str(), &otp_message(&code))
            .await
        {
            tracing::warn!(client_id = %client.id, error = %e, "Failed to send OTP SMS");
        }
        Ok(())
    }

    // =========================================================================
    // Shopper sign-in
    // =========================================================================

    /// Sign in with phone or username plus password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the account is unknown,
    /// has no password, or the password does not match.
    /// Returns `AuthError::InactiveAccount` if the account is not active.
    #[tracing::instrument(skip(self, password))]
    pub async fn login_with_password(
        &self,
        identifier: &str,
        password: &str,
        cart: Option<CartId>,
    ) -> Result<ShopperSession, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let by_phone = match Phone::parse(identifier) {
            Ok(phone) => self.clients.get_by_phone(&phone).await?,
            Err(_) => None,
        };
        let client = match by_phone {
            Some(client) => client,
            None => self
                .clients
                .get_by_username(identifier)
                .await?
                .ok_or(AuthError::InvalidCredentials)?,
        };

        if !client.is_active {
            return Err(AuthError::InactiveAccount);
        }

        let hash = client
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, hash)?;

        self.start_session(client, cart).await
    }

    /// Sign in with an identity vouched for by an external provider.
    ///
    /// Matches by provider id, then by email (linking the provider id),
    /// and otherwise creates an active account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InactiveAccount` if the matched account is inactive.
    #[tracing::instrument(skip(self, identity), fields(external_id = %identity.external_id))]
    pub async fn login_with_identity(
        &self,
        identity: &ExternalIdentity,
        cart: Option<CartId>,
    ) -> Result<ShopperSession, AuthError> {
        let email = identity
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring unusable email from identity provider");
                None
            });

        let client = if let Some(client) = self
            .clients
            .get_by_google_id(&identity.external_id)
            .await?
        {
            client
        } else if let Some(existing) = match &email {
            Some(email) => self.clients.get_by_email(email).await?,
            None => None,
        } {
            self.clients
                .link_google_id(existing.id, &identity.external_id)
                .await?
        } else {
            self.create_from_identity(identity, email.as_ref()).await?
        };

        if !client.is_active {
            return Err(AuthError::InactiveAccount);
        }

        self.start_session(client, cart).await
    }

    async fn create_from_identity(
        &self,
        identity: &ExternalIdentity,
        email: Option<&Email>,
    ) -> Result<Client, AuthError> {
        let username = identity.display_name.as_deref();
        match self
            .clients
            .create_from_identity(&identity.external_id, email, username)
            .await
        {
            // display names are not unique; fall back to no username
            Err(RepositoryError::Conflict(_)) if username.is_some() => Ok(self
                .clients
                .create_from_identity(&identity.external_id, email, None)
                .await?),
            other => Ok(other?),
        }
    }

    /// Issue a token and settle the cart.
    async fn start_session(
        &self,
        client: Client,
        cart: Option<CartId>,
    ) -> Result<ShopperSession, AuthError> {
        let token = self.tokens.issue_client(client.id).await?;
        let cart = self.carts.resolve_for_login(client.id, cart).await?;

        sentry::add_breadcrumb(sentry::Breadcrumb {
            category: Some("auth".into()),
            message: Some(format!("Shopper {} signed in", client.id)),
            level: sentry::Level::Info,
            ..Default::default()
        });

        Ok(ShopperSession {
            client,
            token,
            cart_id: cart.id,
        })
    }

    /// Revoke the shopper's token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the client does not exist.
    pub async fn logout(&self, client_id: ClientId) -> Result<(), AuthError> {
        self.tokens.revoke_client(client_id).await
    }

    /// Update the shopper's own profile. Blank fields are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername` or `AuthError::InvalidEmail` for
    /// bad input, and `AuthError::DuplicateIdentifier` if the username or
    /// email belongs to another account.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        client_id: ClientId,
        update: &ProfileChanges<'_>,
    ) -> Result<Client, AuthError> {
        let username = update
            .username
            .filter(|u| !u.trim().is_empty())
            .map(validate_username)
            .transpose()?;
        let email = update
            .email
            .filter(|e| !e.trim().is_empty())
            .map(Email::parse)
            .transpose()?;

        let changes = ProfileUpdate {
            username,
            email: email.as_ref(),
            date_of_birth: update.date_of_birth,
        };
        self.clients
            .update_profile(client_id, &changes)
            .await
            .map_err(duplicate_on_conflict)
    }

    // =========================================================================
    // Admin
    // =========================================================================

    /// Sign an admin in by username or email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the admin is unknown or the
    /// password does not match.
    /// Returns `AuthError::InactiveAccount` if the admin is disabled.
    #[tracing::instrument(skip(self, password))]
    pub async fn admin_login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<AdminSession, AuthError> {
        let admin = self
            .admins
            .get_by_login(identifier.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !admin.is_active {
            return Err(AuthError::InactiveAccount);
        }
        verify_password(password, &admin.password_hash)?;

        let token = self.tokens.issue_admin(admin.id).await?;
        tracing::info!(admin_id = %admin.id, "Admin signed in");

        Ok(AdminSession { admin, token })
    }

    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the admin does not exist.
    pub async fn admin_logout(&self, admin_id: AdminId) -> Result<(), AuthError> {
        self.tokens.revoke_admin(admin_id).await
    }
}

fn duplicate_on_conflict(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(_) => AuthError::DuplicateIdentifier,
        other => AuthError::Repository(other),
    }
}

/// Six decimal digits, leading zeros allowed.
#[must_use]
pub fn generate_otp() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

/// Validate a username and return it trimmed.
///
/// All-digit usernames are refused since password sign-in tries the
/// identifier as a phone number first.
///
/// # Errors
///
/// Returns `AuthError::InvalidUsername` if the username is unusable.
pub fn validate_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    let length = username.chars().count();
    if !USERNAME_LENGTH.contains(&length) {
        return Err(AuthError::InvalidUsername(format!(
            "username must be {} to {} characters",
            USERNAME_LENGTH.start(),
            USERNAME_LENGTH.end()
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidUsername(
            "username must not contain spaces".to_string(),
        ));
    }
    if username.chars().all(|c| c.is_ascii_digit() || c == '+') {
        return Err(AuthError::InvalidUsername(
            "username must contain a letter".to_string(),
        ));
    }
    Ok(username)
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` if the hash is malformed or does not match.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_otp_is_six_digits() {
        for _ in 0..200 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong password", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_malformed_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  mei_ling ").unwrap(), "mei_ling");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("85366666666").is_err());
        assert!(validate_username(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_conflict_maps_to_duplicate_identifier() {
        assert!(matches!(
            duplicate_on_conflict(RepositoryError::Conflict("client".into())),
            AuthError::DuplicateIdentifier
        ));
        assert!(matches!(
            duplicate_on_conflict(RepositoryError::NotFound),
            AuthError::Repository(RepositoryError::NotFound)
        ));
    }
}
