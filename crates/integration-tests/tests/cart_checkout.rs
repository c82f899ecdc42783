//! Integration tests for cart ownership, checkout, and order processing.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p ryangel-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use ryangel_core::{ClientId, DiscountKind, OrderStatus, PaymentStatus, ProductType};
use ryangel_integration_tests::{
    SHIPPING_FEE, seed_client, seed_code_discount, seed_product, seed_store, test_pool,
};
use ryangel_storefront::db::DiscountRepository;
use ryangel_storefront::services::cart::{CartError, CartService, MAX_LINE_QUANTITY};
use ryangel_storefront::services::checkout::{CheckoutError, CheckoutRequest, CheckoutService};
use ryangel_storefront::services::orders::OrderService;

fn checkout_form(store: &str) -> CheckoutRequest {
    CheckoutRequest {
        pickup_store_id: store.to_string(),
        ..CheckoutRequest::default()
    }
}

/// Number of carts the shopper owns and the units across them.
async fn owned_carts(pool: &PgPool, client_id: ClientId) -> (i64, i64) {
    sqlx::query_as(
        r"
        SELECT COUNT(DISTINCT c.id), COALESCE(SUM(ci.quantity), 0)::BIGINT
        FROM shop.cart c
        LEFT JOIN shop.cart_item ci ON ci.cart_id = c.id
        WHERE c.client_id = $1
        ",
    )
    .bind(client_id.as_i32())
    .fetch_one(pool)
    .await
    .unwrap()
}

// ============================================================================
// Cart ownership
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_claimed_cart_is_not_claimed_twice() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Faiachun, Decimal::from(12)).await;
    let alice = seed_client(&pool).await;
    let bob = seed_client(&pool).await;

    let anonymous = carts.add_item(None, None, product, None, 1).await.unwrap();

    let claimed = carts
        .resolve_for_login(alice.id, Some(anonymous.cart_id))
        .await
        .unwrap();
    assert_eq!(claimed.id, anonymous.cart_id);

    // Bob presenting Alice's cart gets a cart of his own.
    let other = carts
        .resolve_for_login(bob.id, Some(anonymous.cart_id))
        .await
        .unwrap();
    assert_ne!(other.id, anonymous.cart_id);
    assert_eq!(other.client_id, Some(bob.id));

    // Anonymous access to a claimed cart is refused.
    assert!(matches!(
        carts.resolve(None, Some(anonymous.cart_id)).await,
        Err(CartError::UnauthorizedCartAccess)
    ));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_concurrent_claims_have_one_winner() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Bag, Decimal::from(30)).await;
    let alice = seed_client(&pool).await;
    let bob = seed_client(&pool).await;

    let anonymous = carts.add_item(None, None, product, None, 1).await.unwrap();

    let (a, b) = tokio::join!(
        carts.resolve_for_login(alice.id, Some(anonymous.cart_id)),
        carts.resolve_for_login(bob.id, Some(anonymous.cart_id)),
    );
    let winners = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|cart| cart.id == anonymous.cart_id)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_login_merges_existing_cart() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let shared = seed_product(&pool, ProductType::Faiachun, Decimal::from(10)).await;
    let extra = seed_product(&pool, ProductType::Bag, Decimal::from(50)).await;
    let client = seed_client(&pool).await;

    // Cart left over from an earlier visit.
    carts
        .add_item(Some(client.id), None, shared, None, 2)
        .await
        .unwrap();

    let anonymous = carts.add_item(None, None, shared, None, 1).await.unwrap();
    carts
        .add_item(None, Some(anonymous.cart_id), extra, None, 1)
        .await
        .unwrap();

    let cart = carts
        .resolve_for_login(client.id, Some(anonymous.cart_id))
        .await
        .unwrap();
    let view = carts.view(&cart).await.unwrap();

    assert_eq!(view.items.len(), 2);
    let merged = view.items.iter().find(|l| l.product_id == shared).unwrap();
    assert_eq!(merged.quantity, 3);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_concurrent_sign_ins_keep_one_merged_cart() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Bag, Decimal::from(30)).await;

    for _ in 0..10 {
        let client = seed_client(&pool).await;
        let phone_cart = carts.add_item(None, None, product, None, 1).await.unwrap();
        let laptop_cart = carts.add_item(None, None, product, None, 1).await.unwrap();

        let (a, b) = tokio::join!(
            carts.resolve_for_login(client.id, Some(phone_cart.cart_id)),
            carts.resolve_for_login(client.id, Some(laptop_cart.cart_id)),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(owned_carts(&pool, client.id).await, (1, 2));
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_line_quantity_is_capped() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Faiachun, Decimal::from(5)).await;

    let full = carts
        .add_item(None, None, product, None, MAX_LINE_QUANTITY)
        .await
        .unwrap();
    let result = carts
        .add_item(None, Some(full.cart_id), product, None, 1)
        .await;
    assert!(matches!(result, Err(CartError::InvalidQuantity)));

    let cart = carts.resolve(None, Some(full.cart_id)).await.unwrap();
    let view = carts.view(&cart).await.unwrap();
    assert_eq!(view.items[0].quantity, MAX_LINE_QUANTITY);

    // Merging at sign-in clamps instead of failing.
    let client = seed_client(&pool).await;
    carts
        .add_item(Some(client.id), None, product, None, 60)
        .await
        .unwrap();
    let anonymous = carts.add_item(None, None, product, None, 60).await.unwrap();
    let merged = carts
        .resolve_for_login(client.id, Some(anonymous.cart_id))
        .await
        .unwrap();
    let view = carts.view(&merged).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, MAX_LINE_QUANTITY);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_empty_cart_checkout_creates_no_order() {
    let pool = test_pool().await;
    let store = seed_store(&pool).await;
    let client = seed_client(&pool).await;
    CartService::new(&pool, SHIPPING_FEE)
        .resolve(Some(client.id), None)
        .await
        .unwrap();

    let result = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form(&store))
        .await;
    assert!(matches!(result, Err(CheckoutError::EmptyCart)));

    let orders = OrderService::new(&pool)
        .list_for_client(client.id)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_unknown_store_keeps_cart() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Bag, Decimal::from(30)).await;
    let client = seed_client(&pool).await;
    carts
        .add_item(Some(client.id), None, product, None, 1)
        .await
        .unwrap();

    let result = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form("NO-SUCH-STORE"))
        .await;
    assert!(matches!(result, Err(CheckoutError::InvalidPickupStore)));

    let cart = carts.resolve(Some(client.id), None).await.unwrap();
    assert_eq!(carts.view(&cart).await.unwrap().items.len(), 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_order_snapshot_survives_catalog_changes() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let store = seed_store(&pool).await;
    let product = seed_product(&pool, ProductType::Bag, Decimal::from(45)).await;
    let client = seed_client(&pool).await;
    carts
        .add_item(Some(client.id), None, product, None, 2)
        .await
        .unwrap();

    let placed = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form(&store))
        .await
        .unwrap();
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.order.subtotal_amount, Decimal::from(90));
    assert_eq!(placed.order.total_amount, Decimal::from(90) + SHIPPING_FEE);
    let original_name = placed.items[0].product_name.clone();

    sqlx::query("UPDATE shop.product SET price = 99, name = 'Renamed' WHERE id = $1")
        .bind(product)
        .execute(&pool)
        .await
        .unwrap();

    let detail = OrderService::new(&pool)
        .detail_for_client(placed.order.id, client.id)
        .await
        .unwrap();
    assert_eq!(detail.items[0].unit_price, Decimal::from(45));
    assert_eq!(detail.items[0].product_name, original_name);
    assert_eq!(detail.order.total_amount, placed.order.total_amount);

    // The cart was emptied by checkout.
    let cart = carts.resolve(Some(client.id), None).await.unwrap();
    assert!(carts.view(&cart).await.unwrap().items.is_empty());
}

// ============================================================================
// Promotions
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_freezes_buy_x_get_y_code() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let store = seed_store(&pool).await;
    let cheap = seed_product(&pool, ProductType::Faiachun, Decimal::from(10)).await;
    let dear = seed_product(&pool, ProductType::Faiachun, Decimal::from(20)).await;
    let client = seed_client(&pool).await;
    let now = Utc::now();
    let (discount_id, code) = seed_code_discount(
        &pool,
        DiscountKind::BuyXGetY {
            buy: 2,
            get: 1,
            restriction: ProductType::Faiachun,
        },
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .await;

    carts
        .add_item(Some(client.id), None, cheap, None, 2)
        .await
        .unwrap();
    carts
        .add_item(Some(client.id), None, dear, None, 1)
        .await
        .unwrap();

    let view = carts.apply_discount(client.id, None, &code).await.unwrap();
    assert_eq!(view.discount_id, Some(discount_id));
    assert_eq!(view.pricing.discount, Decimal::from(10));

    let placed = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form(&store))
        .await
        .unwrap();
    assert_eq!(placed.order.subtotal_amount, Decimal::from(40));
    assert_eq!(placed.order.discount_amount, Decimal::from(10));
    assert_eq!(placed.order.shipping_amount, SHIPPING_FEE);
    assert_eq!(placed.order.total_amount, Decimal::from(30) + SHIPPING_FEE);
    assert_eq!(placed.order.discount_id, Some(discount_id));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_freezes_free_shipping_code() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let store = seed_store(&pool).await;
    let product = seed_product(&pool, ProductType::Faiachun, Decimal::from(10)).await;
    let client = seed_client(&pool).await;
    let now = Utc::now();
    let (_, code) = seed_code_discount(
        &pool,
        DiscountKind::FreeShipping {
            threshold: 4,
            restriction: ProductType::Faiachun,
        },
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .await;

    carts
        .add_item(Some(client.id), None, product, None, 4)
        .await
        .unwrap();
    carts.apply_discount(client.id, None, &code).await.unwrap();

    let placed = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form(&store))
        .await
        .unwrap();
    assert_eq!(placed.order.shipping_amount, Decimal::ZERO);
    assert_eq!(placed.order.total_amount, Decimal::from(40));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_remove_discount_restores_price() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Faiachun, Decimal::from(10)).await;
    let client = seed_client(&pool).await;
    let now = Utc::now();
    let (_, code) = seed_code_discount(
        &pool,
        DiscountKind::BuyXGetY {
            buy: 1,
            get: 1,
            restriction: ProductType::Faiachun,
        },
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .await;

    carts
        .add_item(Some(client.id), None, product, None, 2)
        .await
        .unwrap();
    // Codes match case-insensitively.
    let applied = carts
        .apply_discount(client.id, None, &code.to_lowercase())
        .await
        .unwrap();
    assert_eq!(applied.pricing.discount, Decimal::from(10));

    let removed = carts.remove_discount(client.id, None).await.unwrap();
    assert_eq!(removed.discount_id, None);
    assert_eq!(removed.pricing.discount, Decimal::ZERO);
    assert_eq!(removed.pricing.total, Decimal::from(20) + SHIPPING_FEE);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_codes_outside_their_window_are_refused() {
    let pool = test_pool().await;
    let carts = CartService::new(&pool, SHIPPING_FEE);
    let client = seed_client(&pool).await;
    let now = Utc::now();
    let kind = DiscountKind::FreeShipping {
        threshold: 1,
        restriction: ProductType::Faiachun,
    };
    let (_, expired) =
        seed_code_discount(&pool, kind, now - Duration::days(10), now - Duration::days(1)).await;
    let (_, upcoming) =
        seed_code_discount(&pool, kind, now + Duration::days(1), now + Duration::days(10)).await;

    for code in [expired.as_str(), upcoming.as_str(), "NO-SUCH-CODE"] {
        assert!(matches!(
            carts.apply_discount(client.id, None, code).await,
            Err(CartError::InvalidDiscountCode)
        ));
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_rule_window_includes_both_ends() {
    let pool = test_pool().await;
    let start = Utc.with_ymd_and_hms(2031, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2031, 3, 31, 23, 59, 59).unwrap();
    let (id, _) = seed_code_discount(
        &pool,
        DiscountKind::FreeShipping {
            threshold: 4,
            restriction: ProductType::Faiachun,
        },
        start,
        end,
    )
    .await;

    let discounts = DiscountRepository::new(&pool);
    for (at, live) in [
        (start, true),
        (end, true),
        (start - Duration::seconds(1), false),
        (end + Duration::seconds(1), false),
    ] {
        let rules = discounts.rules_for_cart(Some(id), at).await.unwrap();
        assert_eq!(rules.iter().any(|rule| rule.id == id), live, "at {at}");
    }
}

// ============================================================================
// Order processing
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_milestones_keep_first_timestamp() {
    let pool = test_pool().await;
    let store = seed_store(&pool).await;
    let product = seed_product(&pool, ProductType::Faiachun, Decimal::from(8)).await;
    let client = seed_client(&pool).await;
    CartService::new(&pool, SHIPPING_FEE)
        .add_item(Some(client.id), None, product, None, 1)
        .await
        .unwrap();
    let placed = CheckoutService::new(&pool, SHIPPING_FEE)
        .place_order(&client, &checkout_form(&store))
        .await
        .unwrap();

    let orders = OrderService::new(&pool);
    let shipped = orders
        .update_status(placed.order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    let first_shipped_at = shipped.shipped_at.unwrap();

    orders
        .update_status(placed.order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    let again = orders
        .update_status(placed.order.id, OrderStatus::Shipped)
        .await
        .unwrap();

    assert_eq!(again.order_status, OrderStatus::Shipped);
    assert_eq!(again.shipped_at, Some(first_shipped_at));
    assert!(again.delivered_at.is_some());

    let paid = orders
        .update_payment_status(placed.order.id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order_status, OrderStatus::Shipped);
}
