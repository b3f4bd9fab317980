//! Integration tests for the Green Basket storefront.
//!
//! The full router runs in-process against fake providers and in-memory
//! stores, so the suite needs no database, Supabase project or Stripe key.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p green-basket-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `storefront_cart` - cart mutations, per-device isolation, persistence
//! - `storefront_auth` - forms, confirmation links, route gate, token refresh
//! - `storefront_checkout` - hosted checkout and order recording
//! - `storefront_health` - health, backend banner, request ids, rate limits

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

pub mod fakes;
pub mod harness;

pub use fakes::{FakeCatalog, FakeIdentity, product};
pub use harness::{Browser, TestApp, TestResponse};
