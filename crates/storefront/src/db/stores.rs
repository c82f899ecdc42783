//! Pickup store repository.

use sqlx::{PgConnection, PgPool};

use super::RepositoryError;
use crate::models::PickupStore;

const STORE_COLUMNS: &str =
    "id, name, store_type, office_hours, address, address_en, latitude, longitude";

#[derive(Debug, sqlx::FromRow)]
struct PickupStoreRow {
    id: String,
    name: String,
    store_type: Option<String>,
    office_hours: Option<String>,
    address: Option<String>,
    address_en: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<PickupStoreRow> for PickupStore {
    fn from(row: PickupStoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            store_type: row.store_type,
            office_hours: row.office_hours,
            address: row.address,
            address_en: row.address_en,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

/// Repository for pickup locations.
pub struct PickupStoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PickupStoreRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<PickupStore>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM shop.pickup_store ORDER BY id");
        let rows = sqlx::query_as::<_, PickupStoreRow>(&sql)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<PickupStore>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM shop.pickup_store WHERE id = $1");
        let row = sqlx::query_as::<_, PickupStoreRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Insert or refresh every store in one transaction. Stores missing from
    /// `stores` are kept, since past orders reference them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any upsert fails; nothing is
    /// written in that case.
    pub async fn upsert_all(&self, stores: &[PickupStore]) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for store in stores {
            sqlx::query(
                r"
                INSERT INTO shop.pickup_store
                    (id, name, store_type, office_hours, address, address_en, latitude, longitude)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    store_type = EXCLUDED.store_type,
                    office_hours = EXCLUDED.office_hours,
                    address = EXCLUDED.address,
                    address_en = EXCLUDED.address_en,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    updated_at = NOW()
                ",
            )
            .bind(&store.id)
            .bind(&store.name)
            .bind(store.store_type.as_deref())
            .bind(store.office_hours.as_deref())
            .bind(store.address.as_deref())
            .bind(store.address_en.as_deref())
            .bind(store.latitude)
            .bind(store.longitude)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(stores.len())
    }
}

/// Whether a pickup store exists, read inside the checkout transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn exists_tx(conn: &mut PgConnection, id: &str) -> Result<bool, RepositoryError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shop.pickup_store WHERE id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await?;

    Ok(exists)
}
