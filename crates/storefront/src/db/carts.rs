//! Cart repository.
//!
//! The repository performs no authorization; callers decide who may touch a
//! cart. Ownership only ever moves from anonymous to a shopper, through
//! [`CartRepository::claim_and_merge`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool};

use ryangel_core::{
    CartId, CartItemId, ClientId, DiscountId, ProductId, ProductType, SizeType,
};

use super::RepositoryError;
use crate::models::{Cart, CartLine};

const CART_COLUMNS: &str = "id, client_id, discount_id, created_at, updated_at";

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: CartId,
    client_id: Option<ClientId>,
    discount_id: Option<DiscountId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            discount_id: row.discount_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    product_name: String,
    product_type: ProductType,
    sku: String,
    size_type: Option<SizeType>,
    quantity: i32,
    unit_price: Decimal,
    stock_quantity: i32,
    added_at: DateTime<Utc>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_type: row.product_type,
            sku: row.sku,
            size_type: row.size_type,
            quantity: row.quantity,
            unit_price: row.unit_price,
            stock_quantity: row.stock_quantity,
            added_at: row.added_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for cart and cart item operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an empty cart, anonymous when `owner` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, owner: Option<ClientId>) -> Result<Cart, RepositoryError> {
        let sql = format!("INSERT INTO shop.cart (client_id) VALUES ($1) RETURNING {CART_COLUMNS}");
        let row = sqlx::query_as::<_, CartRow>(&sql)
            .bind(owner)
            .fetch_one(self.pool)
            .await?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        let sql = format!("SELECT {CART_COLUMNS} FROM shop.cart WHERE id = $1");
        let row = sqlx::query_as::<_, CartRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// The shopper's most recently updated cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM shop.cart WHERE client_id = $1 \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, CartRow>(&sql)
            .bind(client_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Claim `id` for the shopper and fold their other carts into it.
    ///
    /// Runs as one transaction that first locks the shopper's row, so two
    /// sign-ins by the same shopper take turns instead of deleting each
    /// other's carts. The claim takes when the cart is anonymous or already
    /// belongs to `client_id`; another shopper's cart is never stolen.
    /// Quantities of matching lines are added together, capped at
    /// [`MAX_LINE_QUANTITY`], and the folded carts are deleted.
    ///
    /// Returns the claimed cart and the number of carts removed, or `None`
    /// (with nothing changed) when the claim does not take.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// changed in that case.
    pub async fn claim_and_merge(
        &self,
        id: CartId,
        client_id: ClientId,
    ) -> Result<Option<(Cart, u64)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let shopper: Option<ClientId> =
            sqlx::query_scalar("SELECT id FROM shop.client WHERE id = $1 FOR UPDATE")
                .bind(client_id)
                .fetch_optional(&mut *tx)
                .await?;
        if shopper.is_none() {
            return Ok(None);
        }

        let sql = format!(
            "UPDATE shop.cart SET client_id = $2, updated_at = NOW() \
             WHERE id = $1 AND (client_id IS NULL OR client_id = $2) \
             RETURNING {CART_COLUMNS}"
        );
        let Some(claimed) = sqlx::query_as::<_, CartRow>(&sql)
            .bind(id)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, size_type, quantity)
            SELECT $1, ci.product_id, ci.size_type, LEAST(SUM(ci.quantity), $3)::INTEGER
            FROM shop.cart_item ci
            JOIN shop.cart c ON c.id = ci.cart_id
            WHERE c.client_id = $2 AND c.id <> $1
            GROUP BY ci.product_id, ci.size_type
            ON CONFLICT ON CONSTRAINT cart_item_line_key
            DO UPDATE SET quantity = LEAST(shop.cart_item.quantity + EXCLUDED.quantity, $3)
            ",
        )
        .bind(id)
        .bind(client_id)
        .bind(MAX_LINE_QUANTITY)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM shop.cart WHERE client_id = $2 AND id <> $1")
            .bind(id)
            .bind(client_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(Some((claimed.into(), removed)))
    }

    /// Add units of a product, merging with an existing line of the same size.
    ///
    /// Returns `None`, leaving the line as it was, when the merged quantity
    /// would exceed [`MAX_LINE_QUANTITY`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        size_type: Option<SizeType>,
        quantity: i32,
    ) -> Result<Option<CartItemId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: Option<CartItemId> = sqlx::query_scalar(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, size_type, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT cart_item_line_key
            DO UPDATE SET quantity = shop.cart_item.quantity + EXCLUDED.quantity
            WHERE shop.cart_item.quantity + EXCLUDED.quantity <= $5
            RETURNING id
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(size_type)
        .bind(quantity)
        .bind(MAX_LINE_QUANTITY)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(id) = id else {
            return Ok(None);
        };

        touch(&mut *tx, cart_id).await?;
        tx.commit().await?;
        Ok(Some(id))
    }

    /// Which cart an item belongs to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cart_of_item(&self, item_id: CartItemId) -> Result<Option<Cart>, RepositoryError> {
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM shop.cart \
             WHERE id = (SELECT cart_id FROM shop.cart_item WHERE id = $1)"
        );
        let row = sqlx::query_as::<_, CartRow>(&sql)
            .bind(item_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Set an item's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item does not exist.
    pub async fn set_item_quantity(
        &self,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        if quantity <= 0 {
            return self.remove_item(item_id).await;
        }

        let cart_id: Option<CartId> = sqlx::query_scalar(
            "UPDATE shop.cart_item SET quantity = $2 WHERE id = $1 RETURNING cart_id",
        )
        .bind(item_id)
        .bind(quantity)
        .fetch_optional(self.pool)
        .await?;

        let cart_id = cart_id.ok_or(RepositoryError::NotFound)?;
        touch(self.pool, cart_id).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item does not exist.
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<(), RepositoryError> {
        let cart_id: Option<CartId> =
            sqlx::query_scalar("DELETE FROM shop.cart_item WHERE id = $1 RETURNING cart_id")
                .bind(item_id)
                .fetch_optional(self.pool)
                .await?;

        let cart_id = cart_id.ok_or(RepositoryError::NotFound)?;
        touch(self.pool, cart_id).await
    }

    /// Remove every item; the cart itself survives.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, cart_id: CartId) -> Result<u64, RepositoryError> {
        clear_tx_inner(self.pool, cart_id).await
    }

    /// Attach (or with `None`, detach) a code discount.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart does not exist.
    pub async fn set_discount(
        &self,
        cart_id: CartId,
        discount_id: Option<DiscountId>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.cart SET discount_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(cart_id)
        .bind(discount_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Items priced from the live catalog, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        lines_inner(self.pool, cart_id).await
    }
}

// =============================================================================
// Transaction-scoped operations (checkout)
// =============================================================================

/// Lock a cart row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_tx(conn: &mut PgConnection, id: CartId) -> Result<Option<Cart>, RepositoryError> {
    let sql = format!("SELECT {CART_COLUMNS} FROM shop.cart WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(Into::into))
}

/// Lock the shopper's most recently updated cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_latest_for_client_tx(
    conn: &mut PgConnection,
    client_id: ClientId,
) -> Result<Option<Cart>, RepositoryError> {
    let sql = format!(
        "SELECT {CART_COLUMNS} FROM shop.cart WHERE client_id = $1 \
         ORDER BY updated_at DESC, created_at DESC LIMIT 1 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, CartRow>(&sql)
        .bind(client_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(Into::into))
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lines_tx(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<CartLine>, RepositoryError> {
    lines_inner(conn, cart_id).await
}

/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn clear_tx(conn: &mut PgConnection, cart_id: CartId) -> Result<u64, RepositoryError> {
    clear_tx_inner(conn, cart_id).await
}

async fn lines_inner<'e, E>(executor: E, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, CartLineRow>(
        r"
        SELECT ci.id, ci.cart_id, ci.product_id,
               p.name AS product_name, p.product_type, p.sku,
               ci.size_type, ci.quantity,
               p.price AS unit_price, p.stock_quantity, ci.added_at
        FROM shop.cart_item ci
        JOIN shop.product p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.added_at, ci.id
        ",
    )
    .bind(cart_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn clear_tx_inner<'e, E>(executor: E, cart_id: CartId) -> Result<u64, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
        .bind(cart_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

async fn touch<'e, E>(executor: E, cart_id: CartId) -> Result<(), RepositoryError>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE shop.cart SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(executor)
        .await?;
    Ok(())
}
