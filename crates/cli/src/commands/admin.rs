//! Back-office account management.
//!
//! # Usage
//!
//! ```bash
//! RYANGEL_ADMIN_PASSWORD='...' ryangel-cli admin create -u alice -e alice@ryangel.com
//! ```
//!
//! The password is read from an environment variable so it never shows up
//! in shell history or the process list.
//!
//! # Environment Variables
//!
//! - `RYANGEL_DATABASE_URL` - `PostgreSQL` connection string

use ryangel_core::{AdminId, Email};
use ryangel_storefront::db::{AdminRepository, RepositoryError};
use ryangel_storefront::services::auth::{
    AuthError, hash_password, validate_password, validate_username,
};
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Username or password rejected.
    #[error("{0}")]
    Invalid(#[from] AuthError),

    /// Username or email already taken.
    #[error("Admin already exists with username or email: {0}")]
    UserExists(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

/// Create a back-office account.
///
/// # Errors
///
/// Returns an error if validation fails, the account already exists, or
/// the database is unreachable.
pub async fn create(username: &str, email: &str, password_env: &str) -> Result<AdminId, AdminError> {
    let _ = dotenvy::dotenv();

    let password = std::env::var(password_env)
        .map_err(|_| AdminError::MissingEnvVar(password_env.to_owned()))?;
    let username = validate_username(username)?;
    validate_password(&password)?;
    let email = Email::parse(email).map_err(|e| AdminError::InvalidEmail(e.to_string()))?;

    let database_url = std::env::var("RYANGEL_DATABASE_URL")
        .map_err(|_| AdminError::MissingEnvVar("RYANGEL_DATABASE_URL".to_owned()))?;

    tracing::info!("Connecting to database...");
    let pool = ryangel_storefront::db::create_pool(&SecretString::from(database_url)).await?;

    let hash = hash_password(&password)?;
    let admin = AdminRepository::new(&pool)
        .create(username, &email, &hash)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(username.to_owned()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!("Admin created successfully!");
    tracing::info!("  ID: {}", admin.id);
    tracing::info!("  Username: {}", admin.username);
    tracing::info!("  Email: {}", email);

    Ok(admin.id)
}
