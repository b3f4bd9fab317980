//! Green Basket Core - Shared domain types and pure storefront logic.
//!
//! This crate provides the pieces of the storefront that have real invariants:
//! - `storefront` - Public HTTP service (route gate, cart, checkout, accounts)
//! - `cli` - Terminal shopper client and migrations
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Persistence, provider calls and scheduling live in
//! the storefront crate and wrap the logic defined here.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, prices and emails
//! - [`cart`] - Cart line items, cart state and its persisted snapshot
//! - [`auth`] - Tri-state authentication value and provider events
//! - [`routes`] - Route gate rules
//! - [`validation`] - Login, registration and password form rules
//! - [`catalog`] - Product types and catalog filtering helpers
//! - [`order`] - Order records built from a cart

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod order;
pub mod routes;
pub mod types;
pub mod validation;

pub use auth::{AuthEvent, AuthState, AuthUser};
pub use cart::{CartLineItem, CartSnapshot, CartState};
pub use catalog::{Product, ProductPrice};
pub use order::{NewOrder, Order, newest_first};
pub use routes::{GateDecision, RouteRules};
pub use types::*;
pub use validation::FieldErrors;
