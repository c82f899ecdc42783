//! Checkout.
//!
//! Turns a shopper's cart into an order inside one transaction:
//!
//! 1. Lock the cart row
//! 2. Read its lines priced from the live catalog
//! 3. Check the pickup store and price the lines with the current rules
//! 4. Save contact details from the form onto the shopper
//! 5. Insert the order, its frozen lines, and an optional payment proof
//! 6. Empty the cart
//!
//! Any failure drops the transaction, which rolls every step back.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Connection, PgConnection, PgPool};
use thiserror::Error;

use ryangel_core::{CartId, DiscountId, Email, EmailError, PaymentMethod, Phone, PhoneError};

use crate::db::orders::{self as order_db, NewOrder};
use crate::db::{RepositoryError, carts, clients, discounts, stores};
use crate::models::{Cart, Client, OrderDetail};
use crate::services::cart::price_lines;

/// Characters used in order numbers; no `0`/`O` or `1`/`I`.
const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Random characters after the date.
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Attempts at finding an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No cart to check out, or the named cart is not the shopper's.
    #[error("cart not found")]
    CartNotFound,

    /// The named cart belongs to another shopper.
    #[error("unauthorized cart access")]
    UnauthorizedCartAccess,

    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid pickup store")]
    InvalidPickupStore,

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// Every generated order number collided.
    #[error("could not allocate an order number")]
    OrderNumberExhausted,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Checkout form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    /// Cart to check out; defaults to the shopper's latest cart.
    #[serde(default)]
    pub cart_id: Option<CartId>,
    #[serde(alias = "ebuy_store_id")]
    pub pickup_store_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    /// Location of an already uploaded payment screenshot.
    #[serde(default)]
    pub proof_path: Option<String>,
}

/// Form values after validation.
#[derive(Debug)]
struct ContactDetails {
    store_id: String,
    name: Option<String>,
    email: Option<Email>,
    instagram: Option<String>,
    phone: Option<Phone>,
}

impl ContactDetails {
    fn from_request(request: &CheckoutRequest) -> Result<Self, CheckoutError> {
        let store_id = request.pickup_store_id.trim();
        if store_id.is_empty() {
            return Err(CheckoutError::InvalidPickupStore);
        }

        Ok(Self {
            store_id: store_id.to_string(),
            name: non_blank(request.name.as_deref()),
            email: non_blank(request.email.as_deref())
                .map(|e| Email::parse(&e))
                .transpose()?,
            instagram: non_blank(request.instagram.as_deref()),
            phone: non_blank(request.phone.as_deref())
                .map(|p| Phone::parse(&p))
                .transpose()?,
        })
    }

    /// Free-text notes shown to staff with the order.
    fn notes(&self) -> String {
        let mut lines = vec![format!("Store: {}", self.store_id)];
        if let Some(name) = &self.name {
            lines.push(format!("Contact: {name}"));
        }
        if let Some(instagram) = &self.instagram {
            lines.push(format!("IG: {instagram}"));
        }
        if let Some(email) = &self.email {
            lines.push(format!("Email: {email}"));
        }
        lines.join("\n")
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// `ORD-YYYYMMDD-XXXXXX` for today.
#[must_use]
pub fn generate_order_number() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ORDER_NUMBER_ALPHABET.len());
            char::from(ORDER_NUMBER_ALPHABET.get(idx).copied().unwrap_or(b'X'))
        })
        .collect();
    format!("ORD-{}-{suffix}", Utc::now().format("%Y%m%d"))
}

/// The promotion recorded on the order: the code the shopper attached if it
/// took effect, otherwise the first rule that did.
fn recorded_discount(attached: Option<DiscountId>, applied: &[DiscountId]) -> Option<DiscountId> {
    attached
        .filter(|id| applied.contains(id))
        .or_else(|| applied.first().copied())
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    shipping_fee: Decimal,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shipping_fee: Decimal) -> Self {
        Self { pool, shipping_fee }
    }

    /// Place an order from the shopper's cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::CartNotFound` if there is no cart to check out.
    /// Returns `CheckoutError::UnauthorizedCartAccess` if the named cart is another shopper's.
    /// Returns `CheckoutError::EmptyCart` if the cart has no items.
    /// Returns `CheckoutError::InvalidPickupStore` for an unknown store.
    /// Nothing is written when an error is returned.
    #[tracing::instrument(skip(self, client, request), fields(client_id = %client.id))]
    pub async fn place_order(
        &self,
        client: &Client,
        request: &CheckoutRequest,
    ) -> Result<OrderDetail, CheckoutError> {
        let contact = ContactDetails::from_request(request)?;
        let mut tx = self.pool.begin().await?;

        let cart = lock_cart(&mut tx, client, request.cart_id).await?;
        let lines = carts::lines_tx(&mut tx, cart.id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        if !stores::exists_tx(&mut tx, &contact.store_id).await? {
            return Err(CheckoutError::InvalidPickupStore);
        }

        let now = Utc::now();
        let rules = discounts::rules_for_cart_tx(&mut tx, cart.discount_id, now).await?;
        let pricing = price_lines(&lines, &rules, now, self.shipping_fee);

        save_contact(&mut tx, client, &contact).await?;

        let notes = contact.notes();
        let contact_phone = contact
            .phone
            .as_ref()
            .or(client.phone.as_ref())
            .map(Phone::as_str);
        let mut order = None;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let order_number = generate_order_number();
            let new = NewOrder {
                order_number: &order_number,
                client_id: client.id,
                subtotal_amount: pricing.subtotal,
                discount_amount: pricing.discount,
                shipping_amount: pricing.discounted_shipping_fee,
                total_amount: pricing.total,
                discount_id: recorded_discount(cart.discount_id, &pricing.applied_discounts),
                pickup_store_id: &contact.store_id,
                contact_phone,
                payment_method: request.payment_method.unwrap_or_default(),
                customer_notes: Some(&notes),
            };
            order = order_db::insert_order_tx(&mut tx, &new).await?;
            if order.is_some() {
                break;
            }
            tracing::warn!(%order_number, "Order number collision, retrying");
        }
        let order = order.ok_or(CheckoutError::OrderNumberExhausted)?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            items.push(order_db::insert_item_tx(&mut tx, order.id, line).await?);
        }

        let mut payment_proofs = Vec::new();
        if let Some(path) = non_blank(request.proof_path.as_deref()) {
            payment_proofs.push(order_db::insert_payment_proof_tx(&mut tx, &order, &path).await?);
        }

        carts::clear_tx(&mut tx, cart.id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order placed"
        );

        Ok(OrderDetail {
            order,
            items,
            payment_proofs,
        })
    }
}

/// Lock the cart being checked out.
async fn lock_cart(
    conn: &mut PgConnection,
    client: &Client,
    requested: Option<CartId>,
) -> Result<Cart, CheckoutError> {
    let Some(cart_id) = requested else {
        return carts::lock_latest_for_client_tx(conn, client.id)
            .await?
            .ok_or(CheckoutError::CartNotFound);
    };

    let cart = carts::lock_tx(conn, cart_id)
        .await?
        .ok_or(CheckoutError::CartNotFound)?;
    match cart.client_id {
        Some(owner) if owner == client.id => Ok(cart),
        Some(_) => Err(CheckoutError::UnauthorizedCartAccess),
        None => Err(CheckoutError::CartNotFound),
    }
}

/// Copy the form's name and email onto the shopper.
///
/// Runs in a savepoint so a name or email already used by another account
/// is skipped instead of failing the order.
async fn save_contact(
    conn: &mut PgConnection,
    client: &Client,
    contact: &ContactDetails,
) -> Result<(), CheckoutError> {
    if contact.name.is_none() && contact.email.is_none() {
        return Ok(());
    }

    let mut savepoint = conn.begin().await?;
    match clients::update_contact_tx(
        &mut savepoint,
        client.id,
        contact.name.as_deref(),
        contact.email.as_ref(),
    )
    .await
    {
        Ok(()) => savepoint.commit().await?,
        Err(RepositoryError::Conflict(what)) => {
            tracing::warn!(client_id = %client.id, %what, "Checkout contact details not saved");
            savepoint.rollback().await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
