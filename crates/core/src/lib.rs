//! RyAngel Core - Shared types and pricing rules.
//!
//! This crate provides common types used across all RyAngel components:
//! - `storefront` - Public and back-office JSON API
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Pricing lives here so the cart view and checkout
//! cannot drift apart.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, contact details, and statuses
//! - [`pricing`] - Promotion rules and the cart pricing evaluator

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use pricing::{DiscountKind, DiscountRule, PricedLine, PricingSummary, evaluate};
pub use types::*;
