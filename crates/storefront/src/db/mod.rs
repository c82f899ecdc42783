//! Database operations for the shop `PostgreSQL` schema.
//!
//! ## Tables (schema `shop`)
//!
//! - `admin` - Back-office accounts
//! - `client` - Shopper accounts, OTP state, and bearer token hashes
//! - `product` - Catalog (read-only from the API)
//! - `discount` - Promotion rules
//! - `cart` / `cart_item` - Anonymous and shopper-owned carts
//! - `orders` / `order_item` - Immutable order snapshots
//! - `payment_proof` - Uploaded proof-of-payment references
//! - `pickup_store` - Pickup locations mirrored from the eBuy feed
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p ryangel-cli -- migrate
//! ```
//!
//! Repositories that take part in checkout expose `*_tx` functions over a
//! `&mut PgConnection` so the caller owns the transaction boundary.

pub mod admins;
pub mod carts;
pub mod clients;
pub mod discounts;
pub mod orders;
pub mod products;
pub mod stores;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use admins::AdminRepository;
pub use carts::CartRepository;
pub use clients::ClientRepository;
pub use discounts::DiscountRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use stores::PickupStoreRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique phone).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to [`RepositoryError::Conflict`], anything else to `Database`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
