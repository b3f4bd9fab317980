//! Session-related types.
//!
//! The cookie session only ever holds opaque identifiers and provider
//! tokens; the user itself is always fetched fresh from the provider.

/// Session keys.
pub mod keys {
    /// Provider access/refresh tokens (`SessionTokens`).
    pub const AUTH_TOKENS: &str = "auth_tokens";

    /// Random id naming this browser's cart slot (`DeviceId`).
    pub const DEVICE_ID: &str = "device_id";

    /// PKCE verifier for a sign-up awaiting its confirmation link.
    pub const PKCE_VERIFIER: &str = "pkce_verifier";
}
