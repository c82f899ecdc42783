//! Shopper account route handlers.
//!
//! Registration and OTP requests answer with a short acknowledgement; every
//! successful sign-in answers with a bearer token and the cart the shopper
//! should keep using.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ryangel_core::CartId;

use super::ApiJson;
use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::RequireClient;
use crate::models::Client;
use crate::services::auth::{
    AuthError, AuthService, OTP_TTL_MINUTES, ProfileChanges, Registration, ShopperSession,
};
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

/// Returned by every successful shopper sign-in.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub client: Client,
    pub cart_id: CartId,
}

impl SessionResponse {
    #[must_use]
    pub fn new(session: ShopperSession, ttl: chrono::Duration) -> Self {
        Self {
            token: session.token.token,
            token_type: "Bearer",
            expires_at: session.token.expires_at,
            expires_in: ttl.num_seconds(),
            client: session.client,
            cart_id: session.cart_id,
        }
    }
}

/// Acknowledgement that a code is on its way.
#[derive(Debug, Serialize)]
pub struct OtpSent {
    pub message: String,
    pub otp_expires_in: i64,
}

impl OtpSent {
    fn to(phone: &str, verb: &str) -> Self {
        Self {
            message: format!("OTP {verb} to {}", phone.trim()),
            otp_expires_in: OTP_TTL_MINUTES * 60,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientEnvelope {
    pub client: Client,
}

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub username: String,
    pub password: String,
}

/// Login form. With a password this is a password login; without one it
/// requests an OTP for `phone`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub otp: String,
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub phone: String,
}

/// Profile update form. Missing or blank fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accept `2001-02-03` or `2001-02-03T00:00:00Z`.
fn parse_date_of_birth(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| {
            AppError::BadRequest("Invalid date format. Use ISO 8601 or YYYY-MM-DD".to_string())
        })
}

/// Register a shopper and text them a code.
///
/// # Route
///
/// `POST /api/clients/register`
#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<RegisterRequest>,
) -> Result<Response> {
    let client = auth_service(&state)
        .register(&Registration {
            phone: &form.phone,
            username: &form.username,
            email: form.email.as_deref(),
            password: &form.password,
        })
        .await?;

    let phone = client
        .phone
        .as_ref()
        .map_or(form.phone.as_str(), |p| p.as_str());
    Ok((StatusCode::CREATED, Json(OtpSent::to(phone, "sent"))).into_response())
}

/// Password login, or an OTP request when no password is given.
///
/// # Route
///
/// `POST /api/clients/login`
#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<LoginRequest>,
) -> Result<Response> {
    let auth = auth_service(&state);

    if let Some(password) = non_blank(form.password.as_deref()) {
        let identifier = non_blank(form.phone.as_deref())
            .or_else(|| non_blank(form.username.as_deref()))
            .ok_or(AuthError::MissingField("phone or username"))?;

        let session = auth
            .login_with_password(identifier, password, form.cart_id)
            .await?;
        let body = SessionResponse::new(session, state.config().token_ttl);
        return Ok(Json(body).into_response());
    }

    let phone = non_blank(form.phone.as_deref()).ok_or(AuthError::MissingField("phone"))?;
    auth.request_otp(phone).await?;
    Ok(Json(OtpSent::to(phone, "sent")).into_response())
}

/// Exchange a code for a session.
///
/// # Route
///
/// `POST /api/clients/verify-otp`
#[instrument(skip(state, form))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<VerifyOtpRequest>,
) -> Result<Json<SessionResponse>> {
    let session = auth_service(&state)
        .verify_otp(&form.phone, &form.otp, form.cart_id)
        .await?;
    Ok(Json(SessionResponse::new(session, state.config().token_ttl)))
}

/// Send a fresh code, also to accounts still pending verification.
///
/// # Route
///
/// `POST /api/clients/resend-otp`
#[instrument(skip(state, form))]
pub async fn resend_otp(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ResendOtpRequest>,
) -> Result<Json<OtpSent>> {
    auth_service(&state).resend_otp(&form.phone).await?;
    Ok(Json(OtpSent::to(&form.phone, "resent")))
}

/// # Route
///
/// `GET /api/clients/me`
pub async fn me(RequireClient(client): RequireClient) -> Json<ClientEnvelope> {
    Json(ClientEnvelope { client })
}

/// # Route
///
/// `PATCH /api/clients/me`
#[instrument(skip(state, client, form), fields(client_id = %client.id))]
pub async fn update_me(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
    ApiJson(form): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ClientEnvelope>> {
    let date_of_birth = non_blank(form.date_of_birth.as_deref())
        .map(parse_date_of_birth)
        .transpose()?;

    let client = auth_service(&state)
        .update_profile(
            client.id,
            &ProfileChanges {
                username: form.username.as_deref(),
                email: form.email.as_deref(),
                date_of_birth,
            },
        )
        .await?;
    Ok(Json(ClientEnvelope { client }))
}

/// Revoke the caller's token.
///
/// # Route
///
/// `POST /api/clients/logout`
#[instrument(skip(state, client), fields(client_id = %client.id))]
pub async fn logout(
    State(state): State<AppState>,
    RequireClient(client): RequireClient,
) -> Result<StatusCode> {
    auth_service(&state).logout(client.id).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
