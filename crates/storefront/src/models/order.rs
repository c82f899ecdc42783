//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use ryangel_core::{
    ClientId, DiscountId, OrderId, OrderItemId, OrderStatus, PaymentMethod, PaymentProofId,
    PaymentProofStatus, PaymentStatus, ProductId, ProductType, SizeType,
};

/// A placed order.
///
/// Amounts are frozen at checkout. Only the two statuses and the milestone
/// timestamps change afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub client_id: ClientId,
    pub order_date: DateTime<Utc>,
    pub order_status: OrderStatus,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_id: Option<DiscountId>,
    pub pickup_store_id: Option<String>,
    pub contact_phone: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub customer_notes: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of one purchased line.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_type: ProductType,
    pub product_sku: String,
    pub size_type: Option<SizeType>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentProof {
    pub id: PaymentProofId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub proof_path: String,
    pub status: PaymentProofStatus,
    pub submitted_at: DateTime<Utc>,
}

/// An order with everything attached to it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment_proofs: Vec<PaymentProof>,
}

/// Back-office headline numbers. Cancelled orders are excluded throughout.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_orders: i64,
    pub total_revenue: Decimal,
    pub pending_orders: i64,
}
