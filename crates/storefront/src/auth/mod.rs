//! Client-side session handling.
//!
//! - [`AuthClient`] - owns the provider session and broadcasts changes
//! - [`SessionHub`] - the process-wide [`AuthState`] cell built on top of it
//!
//! [`AuthState`]: green_basket_core::AuthState

mod client;
mod hub;

pub use client::{AuthChange, AuthClient, Subscription};
pub use hub::{DEFAULT_SIGN_OUT_DELAY, LogNavigator, Navigator, SessionHub};
