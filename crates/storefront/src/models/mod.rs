//! Session-stored types for storefront.

pub mod session;

pub use session::keys as session_keys;
