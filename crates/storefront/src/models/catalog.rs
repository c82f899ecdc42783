//! Catalog and pickup location types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use ryangel_core::{ProductId, ProductType};

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub product_type: ProductType,
    pub sku: String,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A parcel pickup point where orders are collected.
#[derive(Debug, Clone, Serialize)]
pub struct PickupStore {
    pub id: String,
    pub name: String,
    pub store_type: Option<String>,
    pub office_hours: Option<String>,
    pub address: Option<String>,
    pub address_en: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
