//! Route gate.
//!
//! Runs before handlers on every request. Paths outside both rule sets pass
//! straight through without touching the provider. For the rest the session
//! is resolved fresh (refreshing tokens as needed) and the rules decide:
//! anonymous requests to protected paths go to the login page, signed-in
//! requests to login/register go to the dashboard.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::debug;

use green_basket_core::GateDecision;

use super::auth::{ResolvedAuth, current_session};
use crate::error::AppError;
use crate::state::AppState;

/// Middleware applying [`green_basket_core::RouteRules`] to each request.
///
/// The resolved session is left in the request extensions so extractors
/// further down don't ask the provider a second time.
pub async fn route_gate(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if !state.rules().applies(&path) {
        return next.run(request).await;
    }

    let resolved = match current_session(&session, state.identity()).await {
        Ok(resolved) => resolved,
        Err(e) => return AppError::from(e).into_response(),
    };

    match state.rules().decide(&path, resolved.is_some()) {
        GateDecision::Allow => {
            request.extensions_mut().insert(ResolvedAuth(resolved));
            next.run(request).await
        }
        GateDecision::Redirect(to) => {
            debug!(from = %path, to = %to, "route gate redirect");
            Redirect::to(&to).into_response()
        }
    }
}
