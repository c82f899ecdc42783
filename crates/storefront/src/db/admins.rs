//! Admin account repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use ryangel_core::{AdminId, Email};

use super::{RepositoryError, conflict_on_unique};
use crate::models::Admin;

const ADMIN_COLUMNS: &str =
    "id, username, email, password_hash, is_active, last_login, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AdminRow {
    id: i32,
    username: String,
    email: String,
    password_hash: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdminRow> for Admin {
    type Error = RepositoryError;

    fn try_from(row: AdminRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: AdminId::new(row.id),
            username: row.username,
            email,
            password_hash: row.password_hash,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

/// Repository for admin database operations.
pub struct AdminRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AdminRepository<'a> {
    /// Create a new admin repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up an admin by username or email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_login(&self, identifier: &str) -> Result<Option<Admin>, RepositoryError> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM shop.admin \
             WHERE lower(username) = lower($1) OR lower(email) = lower($1) \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, AdminRow>(&sql)
            .bind(identifier.trim())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: AdminId) -> Result<Option<Admin>, RepositoryError> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM shop.admin WHERE id = $1");
        let row = sqlx::query_as::<_, AdminRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create a new admin.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username or email already exists.
    pub async fn create(
        &self,
        username: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<Admin, RepositoryError> {
        let sql = format!(
            "INSERT INTO shop.admin (username, email, password_hash) \
             VALUES ($1, $2, $3) RETURNING {ADMIN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AdminRow>(&sql)
            .bind(username)
            .bind(email.as_str())
            .bind(password_hash)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "admin"))?;

        row.try_into()
    }

    /// Store a new token hash and stamp `last_login`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the admin does not exist.
    pub async fn set_token(
        &self,
        id: AdminId,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.admin
            SET token_hash = $2, token_expiry = $3, last_login = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(token_hash)
        .bind(expiry)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Find the active admin holding an unexpired token with this hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Admin>, RepositoryError> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM shop.admin \
             WHERE token_hash = $1 AND token_expiry > NOW() AND is_active"
        );
        let row = sqlx::query_as::<_, AdminRow>(&sql)
            .bind(token_hash)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Clear the token. Succeeds even when no token is set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the admin does not exist.
    pub async fn clear_token(&self, id: AdminId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.admin SET token_hash = NULL, token_expiry = NULL WHERE id = $1",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
