//! Cart route handlers.
//!
//! Anonymous shoppers identify their cart with the `X-Cart-ID` header;
//! signed-in shoppers may omit it. Every response carries the priced cart
//! and echoes its id in `X-Cart-ID`, so a client that started without one
//! learns which cart was created for it.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use ryangel_core::{CartItemId, ProductId, SizeType};

use super::ApiJson;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::{CART_ID_HEADER, CartIdHeader, OptionalClient, RequireClient};
use crate::services::cart::{CartService, CartView};
use crate::state::AppState;

fn cart_service(state: &AppState) -> CartService<'_> {
    CartService::new(state.pool(), state.config().shipping_fee)
}

fn cart_response(view: CartView) -> Response {
    ([(CART_ID_HEADER, view.cart_id.to_string())], Json(view)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub size_type: Option<SizeType>,
    #[serde(default = "AddItemRequest::default_quantity")]
    pub quantity: i32,
}

impl AddItemRequest {
    const fn default_quantity() -> i32 {
        1
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct DiscountCodeRequest {
    pub code: String,
}

/// Priced view of the caller's cart, created on first use.
///
/// # Route
///
/// `GET /api/cart`
#[instrument(skip(state, client))]
pub async fn show(
    State(state): State<AppState>,
    OptionalClient(client): OptionalClient,
    CartIdHeader(header): CartIdHeader,
) -> Result<Response> {
    let carts = cart_service(&state);
    let cart = carts.resolve(client.map(|c| c.id), header).await?;
    Ok(cart_response(carts.view(&cart).await?))
}

/// # Route
///
/// `POST /api/cart/items`
#[instrument(skip(state, client))]
pub async fn add_item(
    State(state): State<AppState>,
    OptionalClient(client): OptionalClient,
    CartIdHeader(header): CartIdHeader,
    ApiJson(form): ApiJson<AddItemRequest>,
) -> Result<Response> {
    let view = cart_service(&state)
        .add_item(
            client.map(|c| c.id),
            header,
            form.product_id,
            form.size_type,
            form.quantity,
        )
        .await?;

    add_breadcrumb(
        "cart",
        "Item added",
        Some(&[
            ("product_id", &form.product_id.to_string()),
            ("quantity", &form.quantity.to_string()),
        ]),
    );
    Ok(cart_response(view))
}

/// # Route
///
/// `PATCH /api/cart/items/{id}`
#[instrument(skip(state, client))]
pub async fn update_item(
    State(state): State<AppState>,
    OptionalClient(client): OptionalClient,
    CartIdHeader(header): CartIdHeader,
    Path(item_id): Path<CartItemId>,
    ApiJson(form): ApiJson<UpdateItemRequest>,
) -> Result<Response> {
    let view = cart_service(&state)
        .update_item(client.map(|c| c.id), header, item_id, form.quantity)
        .await?;
    Ok(cart_response(view))
}

/// # Route
///
/// `DELETE /api/cart/items/{id}`
#[instrument(skip(state, client))]
pub async fn remove_item(
    State(state): State<AppState>,
    OptionalClient(client): OptionalClient,
    CartIdHeader(header): CartIdHeader,
    Path(item_id): Path<CartItemId>,
) -> Result<Response> {
    let view = cart_service(&state)
        .remove_item(client.map(|c| c.id), header, item_id)
        .await?;
    Ok(cart_response(view))
}

/// # Route
///
/// `POST /api/cart/discount`
#[instrument(skip(state, client, form), fields(client_id = %client.id))]
pub async fn apply_discount(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
    CartIdHeader(header): CartIdHeader,
    ApiJson(form): ApiJson<DiscountCodeRequest>,
) -> Result<Response> {
    let view = cart_service(&state)
        .apply_discount(client.id, header, form.code.trim())
        .await?;
    Ok(cart_response(view))
}

/// # Route
///
/// `DELETE /api/cart/discount`
#[instrument(skip(state, client), fields(client_id = %client.id))]
pub async fn remove_discount(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
    CartIdHeader(header): CartIdHeader,
) -> Result<Response> {
    let view = cart_service(&state)
        .remove_discount(client.id, header)
        .await?;
    Ok(cart_response(view))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };

    use super::super::test_support::{app, json_body, send};

    #[tokio::test]
    async fn test_malformed_cart_header() {
        let response = send(
            app(None),
            Request::builder()
                .uri("/api/cart")
                .header("x-cart-id", "definitely-not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_discount_requires_shopper() {
        let response = send(
            app(None),
            Request::builder()
                .method("POST")
                .uri("/api/cart/discount")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"code":"CNY2025"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_add_item_rejects_bad_body() {
        let response = send(
            app(None),
            Request::builder()
                .method("POST")
                .uri("/api/cart/items")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"quantity":2}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
