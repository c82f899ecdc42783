//! Integration tests for shopper sign-in and bearer tokens.
//!
//! These tests require a `PostgreSQL` database in `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p ryangel-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::Duration;

use ryangel_core::ProductType;
use ryangel_integration_tests::{
    RecordingSms, SHIPPING_FEE, seed_client, seed_product, test_pool, unique_phone,
    unique_username,
};
use ryangel_storefront::db::clients::MAX_OTP_ATTEMPTS;
use ryangel_storefront::services::auth::{AuthError, AuthService, Registration, TokenService};
use ryangel_storefront::services::cart::CartService;

// ============================================================================
// Tokens
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_token_validate_rotate_revoke() {
    let pool = test_pool().await;
    let client = seed_client(&pool).await;
    let tokens = TokenService::new(&pool, Duration::minutes(60));

    let first = tokens.issue_client(client.id).await.unwrap();
    let resolved = tokens.validate_client(&first.token).await.unwrap();
    assert_eq!(resolved.id, client.id);

    // A new sign-in replaces the previous token.
    let second = tokens.issue_client(client.id).await.unwrap();
    assert!(matches!(
        tokens.validate_client(&first.token).await,
        Err(AuthError::InvalidToken)
    ));
    assert_eq!(
        tokens.validate_client(&second.token).await.unwrap().id,
        client.id
    );

    tokens.revoke_client(client.id).await.unwrap();
    assert!(matches!(
        tokens.validate_client(&second.token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_expired_token_rejected() {
    let pool = test_pool().await;
    let client = seed_client(&pool).await;

    let issued = TokenService::new(&pool, Duration::seconds(-1))
        .issue_client(client.id)
        .await
        .unwrap();

    let result = TokenService::new(&pool, Duration::minutes(60))
        .validate_client(&issued.token)
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_unknown_token_rejected() {
    let pool = test_pool().await;
    let result = TokenService::new(&pool, Duration::minutes(60))
        .validate_client("not-a-real-token")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken)));
}

// ============================================================================
// Registration and OTP
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_otp_is_single_use() {
    let pool = test_pool().await;
    let sms = RecordingSms::default();
    let auth = AuthService::new(&pool, &sms, Duration::minutes(60), SHIPPING_FEE);
    let phone = unique_phone();

    let pending = auth
        .register(&Registration {
            phone: &phone,
            username: &unique_username("otp"),
            email: None,
            password: "correct horse battery",
        })
        .await
        .unwrap();
    assert!(!pending.is_active);

    let code = sms.last_code(&phone).unwrap();
    assert_eq!(code.len(), 6);

    let session = auth.verify_otp(&phone, &code, None).await.unwrap();
    assert!(session.client.is_active);
    assert_eq!(session.client.id, pending.id);

    assert!(matches!(
        auth.verify_otp(&phone, &code, None).await,
        Err(AuthError::InvalidOtp)
    ));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_otp_discarded_after_repeated_misses() {
    let pool = test_pool().await;
    let sms = RecordingSms::default();
    let auth = AuthService::new(&pool, &sms, Duration::minutes(60), SHIPPING_FEE);
    let phone = unique_phone();

    auth.register(&Registration {
        phone: &phone,
        username: &unique_username("guess"),
        email: None,
        password: "correct horse battery",
    })
    .await
    .unwrap();
    let code = sms.last_code(&phone).unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for _ in 0..MAX_OTP_ATTEMPTS {
        assert!(matches!(
            auth.verify_otp(&phone, wrong, None).await,
            Err(AuthError::InvalidOtp)
        ));
    }
    // The right code no longer works once the limit is reached.
    assert!(matches!(
        auth.verify_otp(&phone, &code, None).await,
        Err(AuthError::InvalidOtp)
    ));

    // A fresh code starts a fresh count.
    auth.resend_otp(&phone).await.unwrap();
    let fresh = sms.last_code(&phone).unwrap();
    let wrong = if fresh == "000000" { "111111" } else { "000000" };
    assert!(matches!(
        auth.verify_otp(&phone, wrong, None).await,
        Err(AuthError::InvalidOtp)
    ));
    let session = auth.verify_otp(&phone, &fresh, None).await.unwrap();
    assert!(session.client.is_active);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_pending_account_cannot_use_password() {
    let pool = test_pool().await;
    let sms = RecordingSms::default();
    let auth = AuthService::new(&pool, &sms, Duration::minutes(60), SHIPPING_FEE);
    let phone = unique_phone();

    auth.register(&Registration {
        phone: &phone,
        username: &unique_username("pending"),
        email: None,
        password: "correct horse battery",
    })
    .await
    .unwrap();

    let result = auth
        .login_with_password(&phone, "correct horse battery", None)
        .await;
    assert!(matches!(result, Err(AuthError::InactiveAccount)));
    assert!(matches!(
        auth.request_otp(&phone).await,
        Err(AuthError::InactiveAccount)
    ));

    // Resend still serves pending accounts.
    auth.resend_otp(&phone).await.unwrap();
    assert_eq!(sms.count(), 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_password_login_claims_cart() {
    let pool = test_pool().await;
    let sms = RecordingSms::default();
    let auth = AuthService::new(&pool, &sms, Duration::minutes(60), SHIPPING_FEE);
    let phone = unique_phone();
    let username = unique_username("claim");

    auth.register(&Registration {
        phone: &phone,
        username: &username,
        email: None,
        password: "correct horse battery",
    })
    .await
    .unwrap();
    let code = sms.last_code(&phone).unwrap();
    auth.verify_otp(&phone, &code, None).await.unwrap();

    let carts = CartService::new(&pool, SHIPPING_FEE);
    let product = seed_product(&pool, ProductType::Bag, rust_decimal::Decimal::from(40)).await;
    let anonymous = carts
        .add_item(None, None, product, None, 2)
        .await
        .unwrap();

    let session = auth
        .login_with_password(&username, "correct horse battery", Some(anonymous.cart_id))
        .await
        .unwrap();
    assert_eq!(session.cart_id, anonymous.cart_id);

    let claimed = carts
        .resolve(Some(session.client.id), None)
        .await
        .unwrap();
    assert_eq!(claimed.id, anonymous.cart_id);
    assert_eq!(claimed.client_id, Some(session.client.id));

    assert!(matches!(
        auth.login_with_password(&username, "wrong password", None)
            .await,
        Err(AuthError::InvalidCredentials)
    ));
}
