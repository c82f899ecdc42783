//! Order repository.
//!
//! Orders are written only inside the checkout transaction (the `*_tx`
//! functions) and afterwards only change status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use ryangel_core::{
    ClientId, DiscountId, OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentProofId,
    PaymentProofStatus, PaymentStatus, ProductId, ProductType, SizeType,
};

use super::RepositoryError;
use crate::models::{CartLine, DashboardStats, Order, OrderItem, PaymentProof};

const ORDER_COLUMNS: &str = "id, order_number, client_id, order_date, order_status, \
                             subtotal_amount, discount_amount, shipping_amount, tax_amount, \
                             total_amount, discount_id, pickup_store_id, contact_phone, \
                             payment_method, payment_status, customer_notes, confirmed_at, \
                             shipped_at, delivered_at, cancelled_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, product_type, product_sku, \
                            size_type, unit_price, quantity, total_price";

const PROOF_COLUMNS: &str =
    "id, order_id, client_id, payment_method, amount, proof_path, status, submitted_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    client_id: ClientId,
    order_date: DateTime<Utc>,
    order_status: OrderStatus,
    subtotal_amount: Decimal,
    discount_amount: Decimal,
    shipping_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    discount_id: Option<DiscountId>,
    pickup_store_id: Option<String>,
    contact_phone: Option<String>,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    customer_notes: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            order_number: row.order_number,
            client_id: row.client_id,
            order_date: row.order_date,
            order_status: row.order_status,
            subtotal_amount: row.subtotal_amount,
            discount_amount: row.discount_amount,
            shipping_amount: row.shipping_amount,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            discount_id: row.discount_id,
            pickup_store_id: row.pickup_store_id,
            contact_phone: row.contact_phone,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            customer_notes: row.customer_notes,
            confirmed_at: row.confirmed_at,
            shipped_at: row.shipped_at,
            delivered_at: row.delivered_at,
            cancelled_at: row.cancelled_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    product_type: ProductType,
    product_sku: String,
    size_type: Option<SizeType>,
    unit_price: Decimal,
    quantity: i32,
    total_price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_type: row.product_type,
            product_sku: row.product_sku,
            size_type: row.size_type,
            unit_price: row.unit_price,
            quantity: row.quantity,
            total_price: row.total_price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentProofRow {
    id: PaymentProofId,
    order_id: OrderId,
    client_id: ClientId,
    payment_method: PaymentMethod,
    amount: Decimal,
    proof_path: String,
    status: PaymentProofStatus,
    submitted_at: DateTime<Utc>,
}

impl From<PaymentProofRow> for PaymentProof {
    fn from(row: PaymentProofRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            client_id: row.client_id,
            payment_method: row.payment_method,
            amount: row.amount,
            proof_path: row.proof_path,
            status: row.status,
            submitted_at: row.submitted_at,
        }
    }
}

/// Everything needed to write the order row.
#[derive(Debug)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub client_id: ClientId,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_id: Option<DiscountId>,
    pub pickup_store_id: &'a str,
    pub contact_phone: Option<&'a str>,
    pub payment_method: PaymentMethod,
    pub customer_notes: Option<&'a str>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads and status changes.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Fetch an order only if it belongs to `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_client(
        &self,
        id: OrderId,
        client_id: ClientId,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1 AND client_id = $2");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(client_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// A shopper's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE client_id = $1 \
             ORDER BY order_date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(client_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All orders, newest first, for the back office.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders \
             ORDER BY order_date DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM shop.order_item WHERE order_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(order_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payment_proofs(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PaymentProof>, RepositoryError> {
        let sql = format!(
            "SELECT {PROOF_COLUMNS} FROM shop.payment_proof WHERE order_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, PaymentProofRow>(&sql)
            .bind(order_id)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Move an order to `status`, stamping its milestone timestamp if unset.
    ///
    /// A milestone keeps its first value when the order re-enters the status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let stamp = status
            .milestone()
            .map(|m| {
                let column = m.column();
                format!(", {column} = COALESCE({column}, NOW())")
            })
            .unwrap_or_default();
        let sql = format!(
            "UPDATE shop.orders SET order_status = $2{stamp} WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(status)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order, RepositoryError> {
        let sql = format!(
            "UPDATE shop.orders SET payment_status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(status)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, RepositoryError> {
        let (total_orders, total_revenue, pending_orders): (i64, Decimal, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(total_amount), 0),
                   COUNT(*) FILTER (WHERE order_status = 'pending')
            FROM shop.orders
            WHERE order_status <> 'cancelled'
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(DashboardStats {
            total_orders,
            total_revenue,
            pending_orders,
        })
    }
}

// =============================================================================
// Transaction-scoped writes (checkout)
// =============================================================================

/// Insert the order row. Returns `None` if the order number is already taken.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails for any other reason.
pub async fn insert_order_tx(
    conn: &mut PgConnection,
    new: &NewOrder<'_>,
) -> Result<Option<Order>, RepositoryError> {
    let sql = format!(
        "INSERT INTO shop.orders \
             (order_number, client_id, subtotal_amount, discount_amount, shipping_amount, \
              tax_amount, total_amount, discount_id, pickup_store_id, contact_phone, \
              payment_method, payment_status, customer_notes) \
         VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, 'pending', $11) \
         ON CONFLICT (order_number) DO NOTHING \
         RETURNING {ORDER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(new.order_number)
        .bind(new.client_id)
        .bind(new.subtotal_amount)
        .bind(new.discount_amount)
        .bind(new.shipping_amount)
        .bind(new.total_amount)
        .bind(new.discount_id)
        .bind(new.pickup_store_id)
        .bind(new.contact_phone)
        .bind(new.payment_method)
        .bind(new.customer_notes)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(Into::into))
}

/// Freeze one cart line into the order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item_tx(
    conn: &mut PgConnection,
    order_id: OrderId,
    line: &CartLine,
) -> Result<OrderItem, RepositoryError> {
    let sql = format!(
        "INSERT INTO shop.order_item \
             (order_id, product_id, product_name, product_type, product_sku, size_type, \
              unit_price, quantity, total_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OrderItemRow>(&sql)
        .bind(order_id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(line.product_type)
        .bind(&line.sku)
        .bind(line.size_type)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.line_total())
        .fetch_one(conn)
        .await?;

    Ok(row.into())
}

/// Record an uploaded proof of payment for the order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_payment_proof_tx(
    conn: &mut PgConnection,
    order: &Order,
    proof_path: &str,
) -> Result<PaymentProof, RepositoryError> {
    let sql = format!(
        "INSERT INTO shop.payment_proof (order_id, client_id, payment_method, amount, proof_path, status) \
         VALUES ($1, $2, $3, $4, $5, 'submitted') \
         RETURNING {PROOF_COLUMNS}"
    );
    let row = sqlx::query_as::<_, PaymentProofRow>(&sql)
        .bind(order.id)
        .bind(order.client_id)
        .bind(order.payment_method)
        .bind(order.total_amount)
        .bind(proof_path)
        .fetch_one(conn)
        .await?;

    Ok(row.into())
}
