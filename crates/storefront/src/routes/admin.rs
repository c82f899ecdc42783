//! Back-office route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ryangel_core::{OrderId, OrderStatus, PaymentStatus};

use super::{ApiJson, Page};
use crate::error::{Result, clear_sentry_user};
use crate::middleware::RequireAdmin;
use crate::models::{Admin, DashboardStats, Order, OrderDetail};
use crate::services::auth::{AuthError, AuthService};
use crate::services::orders::OrderService;
use crate::state::AppState;

fn auth_service(state: &AppState) -> AuthService<'_> {
    let config = state.config();
    AuthService::new(
        state.pool(),
        state.sms(),
        config.token_ttl,
        config.shipping_fee,
    )
}

/// Admin login form; either `username` or `email` identifies the admin.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminSessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub admin: Admin,
}

#[derive(Debug, Serialize)]
pub struct AdminEnvelope {
    pub admin: Admin,
}

#[derive(Debug, Serialize)]
pub struct OrderEnvelope {
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusUpdate {
    pub payment_status: PaymentStatus,
}

/// # Route
///
/// `POST /api/admin/login`
#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<AdminLoginRequest>,
) -> Result<Json<AdminSessionResponse>> {
    let identifier = [form.username.as_deref(), form.email.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .ok_or(AuthError::MissingField("username or email"))?;

    let session = auth_service(&state)
        .admin_login(identifier, &form.password)
        .await?;

    Ok(Json(AdminSessionResponse {
        token: session.token.token,
        token_type: "Bearer",
        expires_at: session.token.expires_at,
        expires_in: state.config().token_ttl.num_seconds(),
        admin: session.admin,
    }))
}

/// # Route
///
/// `GET /api/admin/me`
pub async fn me(RequireAdmin(admin): RequireAdmin) -> Json<AdminEnvelope> {
    Json(AdminEnvelope { admin })
}

/// # Route
///
/// `POST /api/admin/logout`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn logout(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<StatusCode> {
    auth_service(&state).admin_logout(admin.id).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// # Route
///
/// `GET /api/admin/orders?limit&offset`
#[instrument(skip(state, _admin))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(page): Query<Page>,
) -> Result<Json<OrderPage>> {
    let (limit, offset) = page.clamped();
    let orders = OrderService::new(state.pool())
        .list_all(limit, offset)
        .await?;
    Ok(Json(OrderPage {
        orders,
        limit,
        offset,
    }))
}

/// # Route
///
/// `GET /api/admin/orders/{id}`
#[instrument(skip(state, _admin))]
pub async fn order_detail(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(OrderService::new(state.pool()).detail(id).await?))
}

/// # Route
///
/// `PATCH /api/admin/orders/{id}/status`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Json<OrderEnvelope>> {
    let order = OrderService::new(state.pool())
        .update_status(id, update.status)
        .await?;
    Ok(Json(OrderEnvelope { order }))
}

/// # Route
///
/// `PATCH /api/admin/orders/{id}/payment-status`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_payment_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    ApiJson(update): ApiJson<PaymentStatusUpdate>,
) -> Result<Json<OrderEnvelope>> {
    let order = OrderService::new(state.pool())
        .update_payment_status(id, update.payment_status)
        .await?;
    Ok(Json(OrderEnvelope { order }))
}

/// # Route
///
/// `GET /api/admin/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<DashboardStats>> {
    Ok(Json(OrderService::new(state.pool()).dashboard().await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request};

    use super::super::test_support::{app, json_body, send};
    use super::*;

    #[tokio::test]
    async fn test_login_requires_identifier() {
        let response = send(
            app(None),
            Request::builder()
                .method("POST")
                .uri("/api/admin/login")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "203.0.113.30")
                .body(Body::from(r#"{"password":"correct horse"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_orders_require_admin_token() {
        for uri in ["/api/admin/orders", "/api/admin/dashboard", "/api/admin/me"] {
            let response = send(
                app(None),
                Request::builder().uri(uri).body(Body::empty()).unwrap(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_malformed_bearer_rejected() {
        let response = send(
            app(None),
            Request::builder()
                .uri("/api/admin/orders")
                .header("authorization", "Token abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
