//! Core types for Green Basket.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod price;

pub use email::{Email, EmailError, initials_or_default};
pub use id::*;
pub use price::{CurrencyCode, Price};
