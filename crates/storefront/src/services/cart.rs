//! Cart service.
//!
//! Adds the ownership rules the repository leaves out. A request reaches a
//! cart through two keys: the bearer token (who is calling) and the
//! `X-Cart-ID` header (which cart the browser remembers). The rules are:
//!
//! - an anonymous caller may only use anonymous carts
//! - a shopper may use their own carts, and claims an anonymous cart by
//!   presenting it
//! - nobody touches another shopper's cart
//!
//! Every view is priced through [`ryangel_core::evaluate`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use ryangel_core::{
    CartId, CartItemId, ClientId, DiscountId, DiscountRule, PricedLine, PricingSummary, ProductId,
    SizeType,
};

use crate::db::{CartRepository, DiscountRepository, ProductRepository, RepositoryError};
use crate::models::{Cart, CartLine};

pub use crate::db::carts::MAX_LINE_QUANTITY;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart belongs to someone else.
    #[error("unauthorized cart access")]
    UnauthorizedCartAccess,

    #[error("cart item not found")]
    ItemNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    /// Unknown, expired, or inactive discount code.
    #[error("invalid discount code")]
    InvalidDiscountCode,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A priced cart as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub discount_id: Option<DiscountId>,
    pub items: Vec<CartLine>,
    #[serde(flatten)]
    pub pricing: PricingSummary,
}

/// Price lines with the rules live at this instant.
pub(crate) fn price_lines(
    lines: &[CartLine],
    rules: &[DiscountRule],
    now: DateTime<Utc>,
    shipping_fee: Decimal,
) -> PricingSummary {
    let priced: Vec<PricedLine> = lines.iter().map(CartLine::priced).collect();
    ryangel_core::evaluate(&priced, rules, now, shipping_fee)
}

/// Cart service.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    discounts: DiscountRepository<'a>,
    products: ProductRepository<'a>,
    shipping_fee: Decimal,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shipping_fee: Decimal) -> Self {
        Self {
            carts: CartRepository::new(pool),
            discounts: DiscountRepository::new(pool),
            products: ProductRepository::new(pool),
            shipping_fee,
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Settle which cart a freshly signed-in shopper continues with.
    ///
    /// A presented anonymous cart is claimed and the shopper's other carts
    /// are folded into it. If the claim does not take (unknown cart, it
    /// belongs to someone else, or the claim fails) the shopper's latest cart
    /// is reused, or a new one created.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the fallback lookup fails.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_for_login(
        &self,
        client_id: ClientId,
        presented: Option<CartId>,
    ) -> Result<Cart, CartError> {
        if let Some(cart_id) = presented {
            match self.carts.claim_and_merge(cart_id, client_id).await {
                Ok(Some((cart, merged))) => {
                    if merged > 0 {
                        tracing::info!(%cart_id, merged, "Merged shopper carts into claimed cart");
                    }
                    return Ok(cart);
                }
                Ok(None) => tracing::warn!(%cart_id, "Presented cart could not be claimed"),
                Err(e) => tracing::warn!(%cart_id, error = %e, "Cart claim failed"),
            }
        }

        self.latest_or_create(client_id).await
    }

    /// Find or lazily create the cart a request operates on.
    ///
    /// # Errors
    ///
    /// Returns `CartError::UnauthorizedCartAccess` if the header names a cart
    /// owned by another shopper.
    pub async fn resolve(
        &self,
        caller: Option<ClientId>,
        header: Option<CartId>,
    ) -> Result<Cart, CartError> {
        let presented = match header {
            Some(id) => self.carts.get_by_id(id).await?,
            None => None,
        };

        match (caller, presented) {
            (None, Some(cart)) if cart.is_anonymous() => Ok(cart),
            (None, Some(_)) => Err(CartError::UnauthorizedCartAccess),
            (None, None) => Ok(self.carts.create(None).await?),
            (Some(client_id), Some(cart)) => match cart.client_id {
                Some(owner) if owner == client_id => Ok(cart),
                Some(_) => Err(CartError::UnauthorizedCartAccess),
                None => self.resolve_for_login(client_id, Some(cart.id)).await,
            },
            (Some(client_id), None) => self.latest_or_create(client_id).await,
        }
    }

    async fn latest_or_create(&self, client_id: ClientId) -> Result<Cart, CartError> {
        if let Some(cart) = self.carts.latest_for_client(client_id).await? {
            return Ok(cart);
        }
        Ok(self.carts.create(Some(client_id)).await?)
    }

    /// The cart holding `item_id`, if the caller may modify it.
    async fn authorize_item(
        &self,
        caller: Option<ClientId>,
        header: Option<CartId>,
        item_id: CartItemId,
    ) -> Result<Cart, CartError> {
        let cart = self
            .carts
            .cart_of_item(item_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;

        let allowed = match cart.client_id {
            Some(owner) => caller == Some(owner),
            None => header == Some(cart.id),
        };
        if !allowed {
            return Err(CartError::UnauthorizedCartAccess);
        }
        Ok(cart)
    }

    // =========================================================================
    // Views and mutations
    // =========================================================================

    /// Price a cart against the live catalog and current rules.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the database operation fails.
    pub async fn view(&self, cart: &Cart) -> Result<CartView, CartError> {
        let now = Utc::now();
        let items = self.carts.lines(cart.id).await?;
        let rules = self.discounts.rules_for_cart(cart.discount_id, now).await?;
        let pricing = price_lines(&items, &rules, now, self.shipping_fee);

        Ok(CartView {
            cart_id: cart.id,
            discount_id: cart.discount_id,
            items,
            pricing,
        })
    }

    /// Add units of a product to the resolved cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for a quantity outside `1..=99`, or
    /// when the line would end up above 99.
    /// Returns `CartError::ProductNotFound` if the product is missing or inactive.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        caller: Option<ClientId>,
        header: Option<CartId>,
        product_id: ProductId,
        size_type: Option<SizeType>,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(CartError::InvalidQuantity);
        }
        self.products
            .get_active(product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        let cart = self.resolve(caller, header).await?;
        self.carts
            .add_item(cart.id, product_id, size_type, quantity)
            .await?
            .ok_or(CartError::InvalidQuantity)?;

        self.view(&cart).await
    }

    /// Set a line's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the item does not exist.
    /// Returns `CartError::UnauthorizedCartAccess` if the caller may not edit it.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        caller: Option<ClientId>,
        header: Option<CartId>,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity);
        }
        let cart = self.authorize_item(caller, header, item_id).await?;
        self.carts
            .set_item_quantity(item_id, quantity)
            .await
            .map_err(not_found_as(CartError::ItemNotFound))?;

        self.view(&cart).await
    }

    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the item does not exist.
    /// Returns `CartError::UnauthorizedCartAccess` if the caller may not edit it.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        caller: Option<ClientId>,
        header: Option<CartId>,
        item_id: CartItemId,
    ) -> Result<CartView, CartError> {
        let cart = self.authorize_item(caller, header, item_id).await?;
        self.carts
            .remove_item(item_id)
            .await
            .map_err(not_found_as(CartError::ItemNotFound))?;

        self.view(&cart).await
    }

    /// Attach a promotion code to the shopper's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidDiscountCode` if the code is unknown or not
    /// live right now.
    #[tracing::instrument(skip(self))]
    pub async fn apply_discount(
        &self,
        client_id: ClientId,
        header: Option<CartId>,
        code: &str,
    ) -> Result<CartView, CartError> {
        let rule = self
            .discounts
            .get_by_code(code)
            .await?
            .filter(|rule| rule.applies_at(Utc::now()))
            .ok_or(CartError::InvalidDiscountCode)?;

        let mut cart = self.resolve(Some(client_id), header).await?;
        self.carts.set_discount(cart.id, Some(rule.id)).await?;
        cart.discount_id = Some(rule.id);

        self.view(&cart).await
    }

    /// # Errors
    ///
    /// Returns `CartError::Repository` if the database operation fails.
    pub async fn remove_discount(
        &self,
        client_id: ClientId,
        header: Option<CartId>,
    ) -> Result<CartView, CartError> {
        let mut cart = self.resolve(Some(client_id), header).await?;
        self.carts.set_discount(cart.id, None).await?;
        cart.discount_id = None;

        self.view(&cart).await
    }
}

fn not_found_as(error: CartError) -> impl FnOnce(RepositoryError) -> CartError {
    move |e| match e {
        RepositoryError::NotFound => error,
        other => CartError::Repository(other),
    }
}
