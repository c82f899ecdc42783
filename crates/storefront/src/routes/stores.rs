//! Pickup store route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use crate::db::PickupStoreRepository;
use crate::error::{AppError, Result};
use crate::models::PickupStore;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoreList {
    pub stores: Vec<PickupStore>,
}

/// # Route
///
/// `GET /api/stores`
pub async fn index(State(state): State<AppState>) -> Result<Json<StoreList>> {
    let stores = PickupStoreRepository::new(state.pool()).list().await?;
    Ok(Json(StoreList { stores }))
}

/// # Route
///
/// `GET /api/stores/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PickupStore>> {
    PickupStoreRepository::new(state.pool())
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("pickup store".to_string()))
}
