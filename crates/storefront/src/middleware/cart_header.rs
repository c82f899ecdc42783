//! `X-Cart-ID` header extractor.
//!
//! Anonymous shoppers carry their cart between requests in this header.
//! Signed-in shoppers may send it too, so a cart built before login can be
//! claimed.

use axum::{extract::FromRequestParts, http::request::Parts};

use ryangel_core::CartId;

use crate::error::AppError;

/// The HTTP header name carrying the cart id.
pub const CART_ID_HEADER: &str = "x-cart-id";

/// The cart id presented by the caller, if any.
///
/// An absent or blank header yields `None`. A value that is not a UUID is
/// rejected with 400 before any handler runs.
#[derive(Debug, Clone, Copy)]
pub struct CartIdHeader(pub Option<CartId>);

fn parse_header(parts: &Parts) -> Result<Option<CartId>, AppError> {
    let Some(value) = parts.headers.get(CART_ID_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest("X-Cart-ID must be a UUID".to_string()))?;
    if value.trim().is_empty() {
        return Ok(None);
    }
    CartId::parse(value)
        .map(Some)
        .map_err(|_| AppError::BadRequest("X-Cart-ID must be a UUID".to_string()))
}

impl<S> FromRequestParts<S> for CartIdHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_header(parts).map(Self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        if let Some(value) = value {
            builder = builder.header(CART_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_missing_header() {
        let mut parts = parts_with(None);
        let CartIdHeader(id) = CartIdHeader::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_valid_header() {
        let mut parts = parts_with(Some("6f1c1e0a-3c55-4d7e-9d2b-1b8f0f3a9e21"));
        let CartIdHeader(id) = CartIdHeader::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(
            id.unwrap().to_string(),
            "6f1c1e0a-3c55-4d7e-9d2b-1b8f0f3a9e21"
        );
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let mut parts = parts_with(Some("not-a-uuid"));
        let result = CartIdHeader::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_blank_header_is_absent() {
        assert!(parse_header(&parts_with(Some("  "))).unwrap().is_none());
    }
}
