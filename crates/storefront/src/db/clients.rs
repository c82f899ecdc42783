//! Shopper account repository.
//!
//! Owns every query touching `shop.client`, including the OTP and bearer
//! token columns. Token and OTP values arrive here already hashed or
//! generated; nothing in this module creates secrets.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};

use ryangel_core::{ClientId, Email, Phone};

use super::{RepositoryError, conflict_on_unique};
use crate::models::Client;

/// Wrong guesses a single OTP survives before it is discarded.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

const CLIENT_COLUMNS: &str = "id, phone, username, email, password_hash, google_id, \
                              date_of_birth, is_active, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    id: i32,
    phone: Option<String>,
    username: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    google_id: Option<String>,
    date_of_birth: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClientRow> for Client {
    type Error = RepositoryError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let phone = row
            .phone
            .as_deref()
            .map(Phone::parse)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid phone in database: {e}")))?;
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))?;

        Ok(Self {
            id: ClientId::new(row.id),
            phone,
            username: row.username,
            email,
            password_hash: row.password_hash,
            google_id: row.google_id,
            date_of_birth: row.date_of_birth,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// New shopper registered by phone, pending OTP verification.
#[derive(Debug)]
pub struct NewClient<'a> {
    pub phone: &'a Phone,
    pub username: &'a str,
    pub email: Option<&'a Email>,
    pub password_hash: &'a str,
}

/// Fields a shopper may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Default)]
pub struct ProfileUpdate<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a Email>,
    pub date_of_birth: Option<NaiveDate>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for shopper database operations.
pub struct ClientRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where("id = $1", id.as_i32()).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_phone(&self, phone: &Phone) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where("phone = $1", phone.as_str()).await
    }

    /// Case-insensitive username lookup.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where("lower(username) = lower($1)", username)
            .await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where("lower(email) = lower($1)", email.as_str())
            .await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where("google_id = $1", google_id).await
    }

    async fn fetch_one_where<T>(
        &self,
        predicate: &str,
        value: T,
    ) -> Result<Option<Client>, RepositoryError>
    where
        T: Send + for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM shop.client WHERE {predicate}");
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(value)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Whether an active account already holds this phone or username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_identifier_taken(
        &self,
        phone: &Phone,
        username: &str,
    ) -> Result<bool, RepositoryError> {
        let taken: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM shop.client
                WHERE is_active AND (phone = $1 OR lower(username) = lower($2))
            )
            ",
        )
        .bind(phone.as_str())
        .bind(username)
        .fetch_one(self.pool)
        .await?;

        Ok(taken)
    }

    /// Create an inactive shopper awaiting OTP verification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the phone, username, or email is taken.
    pub async fn create_pending(&self, new: &NewClient<'_>) -> Result<Client, RepositoryError> {
        let sql = format!(
            "INSERT INTO shop.client (phone, username, email, password_hash, is_active) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(new.phone.as_str())
            .bind(new.username)
            .bind(new.email.map(Email::as_str))
            .bind(new.password_hash)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "client"))?;

        row.try_into()
    }

    /// Overwrite the credentials of a still-inactive shopper who registers again.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client is missing or already active.
    /// Returns `RepositoryError::Conflict` if the username or email is taken.
    pub async fn refresh_pending(
        &self,
        id: ClientId,
        new: &NewClient<'_>,
    ) -> Result<Client, RepositoryError> {
        let sql = format!(
            "UPDATE shop.client SET username = $2, email = $3, password_hash = $4 \
             WHERE id = $1 AND NOT is_active RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(id.as_i32())
            .bind(new.username)
            .bind(new.email.map(Email::as_str))
            .bind(new.password_hash)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "client"))?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Create an active shopper from a verified external identity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the Google id or email is already linked.
    pub async fn create_from_identity(
        &self,
        google_id: &str,
        email: Option<&Email>,
        username: Option<&str>,
    ) -> Result<Client, RepositoryError> {
        let sql = format!(
            "INSERT INTO shop.client (google_id, email, username, is_active) \
             VALUES ($1, $2, $3, TRUE) RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(google_id)
            .bind(email.map(Email::as_str))
            .bind(username)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "client"))?;

        row.try_into()
    }

    /// Attach a Google id to an existing account matched by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client does not exist.
    pub async fn link_google_id(
        &self,
        id: ClientId,
        google_id: &str,
    ) -> Result<Client, RepositoryError> {
        let sql = format!(
            "UPDATE shop.client SET google_id = $2 WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(id.as_i32())
            .bind(google_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "google account"))?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Store a fresh OTP, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client does not exist.
    pub async fn set_otp(
        &self,
        id: ClientId,
        code: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.client \
             SET otp_code = $2, otp_code_expiry = $3, otp_attempts = 0 WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(code)
        .bind(expiry)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Consume a live OTP and activate the account in one statement.
    ///
    /// Returns `None` when the phone/code pair does not match or has expired.
    /// A consumed code cannot match again. A wrong guess counts against the
    /// current code, which is discarded after [`MAX_OTP_ATTEMPTS`] misses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_otp(
        &self,
        phone: &Phone,
        code: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        let sql = format!(
            "UPDATE shop.client \
             SET otp_code = NULL, otp_code_expiry = NULL, otp_attempts = 0, is_active = TRUE \
             WHERE phone = $1 AND otp_code = $2 AND otp_code_expiry > NOW() \
             RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(phone.as_str())
            .bind(code)
            .fetch_optional(self.pool)
            .await?;

        if row.is_none() {
            sqlx::query(
                r"
                UPDATE shop.client
                SET otp_attempts = otp_attempts + 1,
                    otp_code = CASE WHEN otp_attempts + 1 >= $2 THEN NULL ELSE otp_code END,
                    otp_code_expiry =
                        CASE WHEN otp_attempts + 1 >= $2 THEN NULL ELSE otp_code_expiry END
                WHERE phone = $1 AND otp_code IS NOT NULL
                ",
            )
            .bind(phone.as_str())
            .bind(MAX_OTP_ATTEMPTS)
            .execute(self.pool)
            .await?;
        }

        row.map(TryInto::try_into).transpose()
    }

    /// Replace the stored token hash. Any previously issued token stops working.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client does not exist.
    pub async fn set_token(
        &self,
        id: ClientId,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.client SET token_hash = $2, token_expiry = $3 WHERE id = $1",
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

    /// Find the active client holding an unexpired token with this hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Client>, RepositoryError> {
        self.fetch_one_where(
            "token_hash = $1 AND token_expiry > NOW() AND is_active",
            token_hash,
        )
        .await
    }

    /// Clear the token. Succeeds even when no token is set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client does not exist.
    pub async fn clear_token(&self, id: ClientId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.client SET token_hash = NULL, token_expiry = NULL WHERE id = $1",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Apply a profile update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the client does not exist.
    /// Returns `RepositoryError::Conflict` if the username or email is taken.
    pub async fn update_profile(
        &self,
        id: ClientId,
        update: &ProfileUpdate<'_>,
    ) -> Result<Client, RepositoryError> {
        let sql = format!(
            "UPDATE shop.client SET \
                 username = COALESCE($2, username), \
                 email = COALESCE($3, email), \
                 date_of_birth = COALESCE($4, date_of_birth) \
             WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(id.as_i32())
            .bind(update.username)
            .bind(update.email.map(Email::as_str))
            .bind(update.date_of_birth)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "username or email"))?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}

/// Fill in contact details captured at checkout, inside the checkout transaction.
///
/// Blank values leave the stored value untouched.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the username or email belongs to
/// another account.
pub async fn update_contact_tx(
    conn: &mut PgConnection,
    id: ClientId,
    username: Option<&str>,
    email: Option<&Email>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE shop.client
        SET username = COALESCE(NULLIF($2, ''), username),
            email = COALESCE(NULLIF($3, ''), email)
        WHERE id = $1
        ",
    )
    .bind(id.as_i32())
    .bind(username)
    .bind(email.map(Email::as_str))
    .execute(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "username or email"))?;

    Ok(())
}
