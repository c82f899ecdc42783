//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use ryangel_core::{ProductId, ProductType};

use super::Page;
use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::models::Product;
use crate::state::AppState;

/// `?product_type&limit&offset`
///
/// Paging fields are spelled out rather than flattened from `Page`; query
/// strings cannot carry numbers through a flattened struct.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub product_type: Option<ProductType>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl ProductQuery {
    fn page(&self) -> Page {
        Page {
            limit: self.limit.unwrap_or(Page::DEFAULT_LIMIT),
            offset: self.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Active products, newest first.
///
/// # Route
///
/// `GET /api/products`
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    let (limit, offset) = query.page().clamped();
    let (products, total) = ProductRepository::new(state.pool())
        .list_active(query.product_type, limit, offset)
        .await?;

    Ok(Json(ProductPage {
        products,
        total,
        limit,
        offset,
    }))
}

/// # Route
///
/// `GET /api/products/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    ProductRepository::new(state.pool())
        .get_active(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("product".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> ProductQuery {
        let uri: axum::http::Uri = uri.parse().unwrap();
        Query::<ProductQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_query_defaults() {
        let query = parse("/api/products");
        assert_eq!(query.page().clamped(), (Page::DEFAULT_LIMIT, 0));
    }

    #[test]
    fn test_query_parses_type_and_paging() {
        let query = parse("/api/products?product_type=bag&limit=500&offset=10");
        assert_eq!(query.product_type, Some(ProductType::Bag));
        assert_eq!(query.page().clamped(), (Page::MAX_LIMIT, 10));
    }
}
