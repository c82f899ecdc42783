//! Domain models for the API.
//!
//! These types represent validated domain objects separate from database row
//! types. Token hashes and OTP codes stay inside the repositories; password
//! hashes are carried for verification but never serialized.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;

pub use account::{Admin, Client};
pub use cart::{Cart, CartLine};
pub use catalog::{PickupStore, Product};
pub use order::{DashboardStats, Order, OrderDetail, OrderItem, PaymentProof};
