//! Account route handlers (dashboard, profile, password, deletion).
//!
//! All of these need a signed-in user; the route gate covers `/dashboard`
//! and `/profile`, and the `RequireAuth` extractor covers the rest.

use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use green_basket_core::validation::ChangePasswordForm;
use green_basket_core::{AuthUser, Order};

use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::{RequireAuth, clear_auth_tokens};
use crate::state::AppState;

use super::FormRedirect;

/// Dashboard data.
#[derive(Debug, Serialize)]
pub struct DashboardPage {
    pub user: AuthUser,
    pub initials: String,
    /// Newest first.
    pub orders: Vec<Order>,
}

/// Profile data.
#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub user: AuthUser,
    pub initials: String,
}

/// The signed-in user's dashboard with order history.
#[instrument(skip_all)]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAuth(signed_in): RequireAuth,
) -> Result<Json<DashboardPage>> {
    let orders = state.orders().list_for_user(&signed_in.user.id).await?;
    Ok(Json(DashboardPage {
        initials: signed_in.user.initials(),
        user: signed_in.user,
        orders,
    }))
}

/// The signed-in user's profile.
pub async fn profile(RequireAuth(signed_in): RequireAuth) -> Json<ProfilePage> {
    Json(ProfilePage {
        initials: signed_in.user.initials(),
        user: signed_in.user,
    })
}

/// Change the signed-in user's password.
///
/// Provider refusals land on the `new_password` field.
#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(signed_in): RequireAuth,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Json<FormRedirect>> {
    let password = form.validate()?;

    state
        .identity()
        .update_password(&signed_in.tokens.access_token, &password)
        .await
        .map_err(|e| AppError::on_field(e, "new_password"))?;

    info!(user_id = %signed_in.user.id, "password changed");
    Ok(Json(FormRedirect::to("/profile")))
}

/// Delete the signed-in user's account, then sign out.
#[instrument(skip_all)]
pub async fn delete(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(signed_in): RequireAuth,
) -> Result<Response> {
    state.identity().delete_user(&signed_in.user.id).await?;
    info!(user_id = %signed_in.user.id, "account deleted");

    clear_auth_tokens(&session).await?;
    clear_sentry_user();

    // The provider usually drops the sessions with the user; revoking is
    // best-effort cleanup.
    let identity = state.identity_handle();
    let access_token = signed_in.tokens.access_token;
    tokio::spawn(async move {
        if let Err(e) = identity.sign_out(&access_token).await {
            warn!(error = %e, "revoke after account deletion failed");
        }
    });

    Ok(Redirect::to("/").into_response())
}
