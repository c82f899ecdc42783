//! Shopper order route handlers: history, detail, and checkout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use ryangel_core::OrderId;

use super::ApiJson;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireClient;
use crate::models::{Order, OrderDetail};
use crate::services::checkout::{CheckoutRequest, CheckoutService};
use crate::services::orders::OrderService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

/// # Route
///
/// `GET /api/orders`
#[instrument(skip(state, client), fields(client_id = %client.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
) -> Result<Json<OrderList>> {
    let orders = OrderService::new(state.pool())
        .list_for_client(client.id)
        .await?;
    Ok(Json(OrderList { orders }))
}

/// # Route
///
/// `GET /api/orders/{id}`
#[instrument(skip(state, client), fields(client_id = %client.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let detail = OrderService::new(state.pool())
        .detail_for_client(id, client.id)
        .await?;
    Ok(Json(detail))
}

/// Turn the shopper's cart into an order.
///
/// # Route
///
/// `POST /api/orders`
#[instrument(skip(state, client, request), fields(client_id = %client.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    let detail = CheckoutService::new(state.pool(), state.config().shipping_fee)
        .place_order(&client, &request)
        .await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_number", detail.order.order_number.as_str())]),
    );
    Ok((StatusCode::CREATED, Json(detail)))
}
