//! Opaque bearer tokens.
//!
//! A token is 32 random bytes, base64url-encoded for transport. Only the hex
//! SHA-256 of the token is stored, so a database leak does not yield usable
//! credentials. Each principal holds one token at a time; issuing a new one
//! overwrites the stored hash.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use ryangel_core::{AdminId, ClientId};

use super::AuthError;
use crate::db::{AdminRepository, ClientRepository};
use crate::models::{Admin, Client};

/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

/// A freshly issued token. The raw value exists only here and in the response.
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Generate a raw token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage form of a raw token.
#[must_use]
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Issues, validates, and revokes tokens for shoppers and admins.
pub struct TokenService<'a> {
    clients: ClientRepository<'a>,
    admins: AdminRepository<'a>,
    ttl: Duration,
}

impl<'a> TokenService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, ttl: Duration) -> Self {
        Self {
            clients: ClientRepository::new(pool),
            admins: AdminRepository::new(pool),
            ttl,
        }
    }

    fn mint(&self) -> (IssuedToken, String) {
        let token = generate_token();
        let hash = hash_token(&token);
        let expires_at = Utc::now() + self.ttl;
        (IssuedToken { token, expires_at }, hash)
    }

    /// Issue a shopper token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the client is gone or the update fails.
    pub async fn issue_client(&self, id: ClientId) -> Result<IssuedToken, AuthError> {
        let (issued, hash) = self.mint();
        self.clients.set_token(id, &hash, issued.expires_at).await?;
        Ok(issued)
    }

    /// Resolve a presented shopper token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for unknown, expired, or inactive-account tokens.
    pub async fn validate_client(&self, raw: &str) -> Result<Client, AuthError> {
        self.clients
            .get_by_token_hash(&hash_token(raw))
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// # Errors
    ///
    /// Returns `AuthError::Repository` with `NotFound` if the client does not exist.
    pub async fn revoke_client(&self, id: ClientId) -> Result<(), AuthError> {
        Ok(self.clients.clear_token(id).await?)
    }

    /// Issue an admin token and stamp the login time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the admin is gone or the update fails.
    pub async fn issue_admin(&self, id: AdminId) -> Result<IssuedToken, AuthError> {
        let (issued, hash) = self.mint();
        self.admins.set_token(id, &hash, issued.expires_at).await?;
        Ok(issued)
    }

    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for unknown, expired, or inactive-account tokens.
    pub async fn validate_admin(&self, raw: &str) -> Result<Admin, AuthError> {
        self.admins
            .get_by_token_hash(&hash_token(raw))
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    /// # Errors
    ///
    /// Returns `AuthError::Repository` with `NotFound` if the admin does not exist.
    pub async fn revoke_admin(&self, id: AdminId) -> Result<(), AuthError> {
        Ok(self.admins.clear_token(id).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_url_safe_and_unpadded() {
        let token = generate_token();
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_token_is_random() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("abc"), hash);
        assert_ne!(hash_token("abd"), hash);
    }

    #[test]
    fn test_issued_token_debug_redacts() {
        let issued = IssuedToken {
            token: "super-secret".to_string(),
            expires_at: Utc::now(),
        };
        let debug = format!("{issued:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
