//! Authentication extractors and session token helpers.
//!
//! The cookie session stores provider tokens only. Every check asks the
//! provider for the user behind them (refreshing when needed), so a
//! revoked or deleted account stops working on the next request.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::warn;

use crate::error::{AppError, set_sentry_user};
use crate::identity::{IdentityProvider, ProviderSession, SessionTokens, resolve_session};
use crate::models::session_keys;
use crate::state::AppState;

/// Session already resolved for this request by the route gate.
#[derive(Debug, Clone)]
pub struct ResolvedAuth(pub Option<ProviderSession>);

/// Look up the provider session behind the cookie session's tokens.
///
/// Rotated tokens are written back. Tokens the provider no longer accepts
/// are removed. A provider outage counts as "no session" for this request
/// but keeps the tokens, so the user is still signed in once it recovers.
///
/// # Errors
///
/// Returns an error if the cookie session cannot be read or written.
pub async fn current_session(
    session: &Session,
    identity: &dyn IdentityProvider,
) -> Result<Option<ProviderSession>, tower_sessions::session::Error> {
    let Some(tokens) = session
        .get::<SessionTokens>(session_keys::AUTH_TOKENS)
        .await?
    else {
        return Ok(None);
    };

    match resolve_session(identity, &tokens).await {
        Ok(Some(resolved)) => {
            if resolved.tokens != tokens {
                set_auth_tokens(session, &resolved.tokens).await?;
            }
            Ok(Some(resolved))
        }
        Ok(None) => {
            clear_auth_tokens(session).await?;
            Ok(None)
        }
        Err(e) => {
            warn!(error = %e, "identity provider unavailable, treating request as signed out");
            Ok(None)
        }
    }
}

/// Extractor that requires a signed-in user.
///
/// If the user is not signed in, page requests are redirected to the login
/// path and `/api/` requests get a 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(signed_in): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", signed_in.user.id)
/// }
/// ```
pub struct RequireAuth(pub ProviderSession);

/// Error returned when authentication is required but the user is not signed in.
pub enum AuthRejection {
    /// Redirect to this login path (page requests).
    RedirectToLogin(String),
    /// Unauthorized response (API requests).
    Unauthorized,
    /// The cookie session itself failed.
    Session(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(path) => Redirect::to(&path).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Session(err) => err.into_response(),
        }
    }
}

/// Session for this request: the gate's answer if it ran, else a fresh lookup.
async fn resolve_for_request(
    parts: &Parts,
    state: &AppState,
) -> Result<Option<ProviderSession>, AppError> {
    if let Some(ResolvedAuth(resolved)) = parts.extensions.get::<ResolvedAuth>() {
        return Ok(resolved.clone());
    }

    let Some(session) = parts.extensions.get::<Session>() else {
        return Ok(None);
    };

    Ok(current_session(session, state.identity()).await?)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let resolved = resolve_for_request(parts, state)
            .await
            .map_err(AuthRejection::Session)?;

        match resolved {
            Some(signed_in) => {
                set_sentry_user(
                    &signed_in.user.id,
                    signed_in.user.email.as_ref().map(|e| e.as_str()),
                );
                Ok(Self(signed_in))
            }
            None if parts.uri.path().starts_with("/api/") => Err(AuthRejection::Unauthorized),
            None => Err(AuthRejection::RedirectToLogin(
                state.rules().login_path.clone(),
            )),
        }
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in or the provider cannot be reached.
pub struct OptionalAuth(pub Option<ProviderSession>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let resolved = resolve_for_request(parts, state).await.unwrap_or_else(|e| {
            warn!(error = %e, "session lookup failed");
            None
        });
        Ok(Self(resolved))
    }
}

/// Store provider tokens in the session.
///
/// The session id is rotated first so a pre-login cookie can't be replayed.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn sign_in_session(
    session: &Session,
    tokens: &SessionTokens,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    set_auth_tokens(session, tokens).await
}

/// Replace the provider tokens in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_auth_tokens(
    session: &Session,
    tokens: &SessionTokens,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::AUTH_TOKENS, tokens).await
}

/// Remove the provider tokens from the session, returning them.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_auth_tokens(
    session: &Session,
) -> Result<Option<SessionTokens>, tower_sessions::session::Error> {
    session
        .remove::<SessionTokens>(session_keys::AUTH_TOKENS)
        .await
}
