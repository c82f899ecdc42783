//! Business logic services for the storefront API.
//!
//! # Services
//!
//! - `auth` - Shopper and admin sign-in, bearer tokens, OTP
//! - `cart` - Cart resolution, ownership checks, priced views
//! - `checkout` - Cart-to-order conversion
//! - `orders` - Order queries and status changes
//! - `stores` - Pickup store feed refresher
//! - `sms` - OTP delivery
//! - `oauth` - Third-party identity providers

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod oauth;
pub mod orders;
pub mod sms;
pub mod stores;
