//! Cart domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use ryangel_core::{
    CartId, CartItemId, ClientId, DiscountId, PricedLine, ProductId, ProductType, SizeType,
};

/// A cart, anonymous when `client_id` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub client_id: Option<ClientId>,
    /// Promotion attached by code.
    pub discount_id: Option<DiscountId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.client_id.is_none()
    }
}

/// A cart item joined with its live catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_type: ProductType,
    pub sku: String,
    pub size_type: Option<SizeType>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub stock_quantity: i32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// View of this line for the pricing evaluator.
    #[must_use]
    pub fn priced(&self) -> PricedLine {
        PricedLine {
            product_type: self.product_type,
            unit_price: self.unit_price,
            // quantity > 0 is a table constraint
            quantity: u32::try_from(self.quantity).unwrap_or(0),
        }
    }
}
