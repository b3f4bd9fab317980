//! Identity provider integration (Supabase Auth).
//!
//! The storefront never stores or checks passwords itself: sign-up, sign-in,
//! password changes and session tokens all go through the provider's REST API.
//!
//! # Components
//!
//! - [`IdentityProvider`] - async trait over the provider, so tests can swap in a fake
//! - [`SupabaseClient`] - `reqwest` implementation against `/auth/v1`
//! - [`resolve_session`] - fresh session lookup with token refresh
//! - [`pkce`] - code verifier/challenge pairs for the confirmation-link flow

pub mod pkce;
mod supabase;
mod types;

pub use supabase::SupabaseClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use green_basket_core::{AuthUser, Email, UserId};

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed (network, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The access or refresh token was rejected.
    #[error("session rejected: {0}")]
    SessionRejected(String),

    /// The provider refused the request (bad credentials, rate limit, ...).
    #[error("{message}")]
    Api {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider message, suitable for showing next to a form field.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// A confirmation code arrived but no PKCE verifier was stored for it.
    #[error("no code verifier for this confirmation link")]
    MissingVerifier,
}

impl IdentityError {
    /// Whether the provider says this session no longer exists.
    #[must_use]
    pub const fn is_session_gone(&self) -> bool {
        matches!(self, Self::SessionRejected(_))
    }

    /// Message suitable for a form field.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::SessionRejected(_) => "Your session has expired. Please sign in again.".to_owned(),
            Self::MissingVerifier => {
                "This confirmation link was opened in a different browser. Please request a new one."
                    .to_owned()
            }
            Self::Http(_) | Self::InvalidResponse(_) => {
                "The sign-in service is unavailable. Please try again later.".to_owned()
            }
        }
    }
}

/// Operations the storefront needs from the identity provider.
///
/// Every call reports failure through [`IdentityError`]; none of them panic.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an email and password for a session.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError>;

    /// Create an account. The provider emails a confirmation link that lands
    /// on `redirect_to`; with a `code_challenge` the link carries a PKCE code.
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: &str,
        code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError>;

    /// Trade a confirmation-link code (plus its PKCE verifier) for a session.
    async fn exchange_code_for_session(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<ProviderSession, IdentityError>;

    /// Rotate tokens.
    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, IdentityError>;

    /// Look up the user behind an access token.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, IdentityError>;

    /// Revoke the session at the provider.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Send the sign-up confirmation email again.
    async fn resend_signup(&self, email: &Email, redirect_to: &str) -> Result<(), IdentityError>;

    /// Change the signed-in user's password.
    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<AuthUser, IdentityError>;

    /// Admin: users whose email matches `filter` (case-insensitive).
    async fn list_users(&self, filter: &str) -> Result<Vec<UserSummary>, IdentityError>;

    /// Admin: delete a user.
    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError>;

    /// Cheap reachability probe.
    async fn health(&self) -> Result<(), IdentityError>;
}

/// Admin check for an existing account with exactly this email.
///
/// # Errors
///
/// Returns the provider error if the admin lookup fails.
pub async fn email_registered(
    provider: &dyn IdentityProvider,
    email: &Email,
) -> Result<bool, IdentityError> {
    let users = provider.list_users(email.as_str()).await?;
    Ok(users.iter().any(|user| {
        user.email
            .as_ref()
            .is_some_and(|e| e.as_str().eq_ignore_ascii_case(email.as_str()))
    }))
}

/// Fetch the current user for a stored set of tokens, straight from the
/// provider.
///
/// Expired tokens are refreshed first; an access token the provider rejects
/// gets one refresh attempt. Returns `Ok(None)` when the provider says the
/// session is gone, so callers can clear their local copy.
///
/// # Errors
///
/// Returns the provider error for anything other than a rejected session
/// (network failures, outages), leaving the local copy untouched.
pub async fn resolve_session(
    provider: &dyn IdentityProvider,
    tokens: &SessionTokens,
) -> Result<Option<ProviderSession>, IdentityError> {
    if !tokens.is_expired() {
        match provider.get_user(&tokens.access_token).await {
            Ok(user) => {
                return Ok(Some(ProviderSession {
                    tokens: tokens.clone(),
                    user,
                }));
            }
            Err(err) if err.is_session_gone() => {
                tracing::debug!(error = %err, "access token rejected, trying refresh");
            }
            Err(err) => return Err(err),
        }
    }

    match provider.refresh_session(&tokens.refresh_token).await {
        Ok(session) => Ok(Some(session)),
        Err(err) if err.is_session_gone() => {
            tracing::info!(error = %err, "refresh token rejected, session is gone");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
