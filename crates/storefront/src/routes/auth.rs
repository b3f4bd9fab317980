//! Authentication route handlers.
//!
//! Sign-in, registration and the confirmation-link callback. Forms answer
//! with `{"redirect_to": ...}` on success and `422 {"errors": ...}` on
//! failure; provider refusals are attached to the email field.

use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument, warn};
use url::form_urlencoded;

use green_basket_core::validation::{
    EMAIL_ALREADY_REGISTERED, LoginForm, RegisterForm, VALID_EMAIL_REQUIRED,
};
use green_basket_core::{AuthUser, Email, FieldErrors};

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::identity::{IdentityError, email_registered, pkce::PkcePair};
use crate::middleware::{OptionalAuth, clear_auth_tokens, sign_in_session};
use crate::models::session_keys;
use crate::state::AppState;

use super::FormRedirect;

const MISSING_CODE: &str = "The confirmation link is missing its code.";

/// Query parameters on the confirmation-link callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub email: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Query parameters on the confirmation error page.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OtpErrorQuery {
    pub error: Option<String>,
    pub email: Option<String>,
}

/// Resend-confirmation form.
#[derive(Debug, Default, Deserialize)]
pub struct ResendForm {
    #[serde(default)]
    pub email: String,
}

/// Informational page body.
#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
}

// =============================================================================
// Login / Logout
// =============================================================================

/// Sign-in page. The route gate sends signed-in users to the dashboard.
pub async fn login_page() -> Json<MessagePage> {
    Json(MessagePage {
        message: "Sign in to your account.",
        user: None,
    })
}

/// Sign-up page.
pub async fn register_page() -> Json<MessagePage> {
    Json(MessagePage {
        message: "Create an account.",
        user: None,
    })
}

/// Sign in with email and password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Json<FormRedirect>> {
    let input = form.validate()?;

    let signed_in = state
        .identity()
        .sign_in_with_password(&input.email, &input.password)
        .await
        .map_err(|e| AppError::on_field(e, "email"))?;

    sign_in_session(&session, &signed_in.tokens).await?;
    set_sentry_user(&signed_in.user.id, Some(input.email.as_str()));
    info!(user_id = %signed_in.user.id, "signed in");

    Ok(Json(FormRedirect::to(&state.rules().landing_path)))
}

/// Sign out.
///
/// The cookie session forgets the tokens before the response is sent;
/// provider revocation runs in the background.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Response> {
    if let Some(tokens) = clear_auth_tokens(&session).await? {
        let identity = state.identity_handle();
        tokio::spawn(async move {
            if let Err(e) = identity.sign_out(&tokens.access_token).await {
                warn!(error = %e, "provider sign-out failed");
            }
        });
    }
    clear_sentry_user();

    Ok(Redirect::to("/").into_response())
}

// =============================================================================
// Registration
// =============================================================================

/// Create an account.
///
/// The provider emails a confirmation link back to `/auth/callback`. If
/// confirmation is disabled the session comes back at once and the user is
/// signed in directly.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Json<FormRedirect>> {
    let input = form.validate()?;

    let taken = email_registered(state.identity(), &input.email)
        .await
        .map_err(|e| AppError::on_field(e, "email"))?;
    if taken {
        return Err(FieldErrors::single("email", EMAIL_ALREADY_REGISTERED).into());
    }

    let pkce = PkcePair::generate();
    session
        .insert(session_keys::PKCE_VERIFIER, &pkce.verifier)
        .await?;

    let redirect_to = callback_url(&state.config().base_url, &input.email);
    let outcome = state
        .identity()
        .sign_up(&input.email, &input.password, &redirect_to, Some(&pkce.challenge))
        .await
        .map_err(|e| AppError::on_field(e, "email"))?;

    if let Some(signed_in) = outcome.session {
        session
            .remove::<String>(session_keys::PKCE_VERIFIER)
            .await?;
        sign_in_session(&session, &signed_in.tokens).await?;
        info!(user_id = %signed_in.user.id, "registered and signed in");
        return Ok(Json(FormRedirect::to(&state.rules().landing_path)));
    }

    info!("registration pending email confirmation");
    Ok(Json(FormRedirect::to("/account_confirmation_check_email")))
}

fn callback_url(base_url: &str, email: &Email) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("email", email.as_str())
        .finish();
    format!("{base_url}/auth/callback?{query}")
}

fn otp_error_path(error: &str, email: Option<&str>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("error", error);
    if let Some(email) = email {
        query.append_pair("email", email);
    }
    format!("/otp_error?{}", query.finish())
}

// =============================================================================
// Confirmation link
// =============================================================================

/// Landing point of the confirmation email.
///
/// Trades the code (with the PKCE verifier stored at sign-up) for a session.
/// Failures go to `/otp_error` with the reason and email, so the page can
/// offer to resend the link.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    let email = query.email.as_deref();

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        let reason = query
            .error_description
            .as_deref()
            .or(query.error.as_deref())
            .unwrap_or(MISSING_CODE);
        return Ok(Redirect::to(&otp_error_path(reason, email)).into_response());
    };

    let verifier = session
        .remove::<String>(session_keys::PKCE_VERIFIER)
        .await?;

    let exchanged = match verifier {
        Some(verifier) => {
            state
                .identity()
                .exchange_code_for_session(code, &verifier)
                .await
        }
        None => Err(IdentityError::MissingVerifier),
    };

    match exchanged {
        Ok(signed_in) => {
            sign_in_session(&session, &signed_in.tokens).await?;
            info!(user_id = %signed_in.user.id, "email confirmed");
            Ok(Redirect::to("/welcome_new_user").into_response())
        }
        Err(e) => {
            warn!(error = %e, "confirmation code exchange failed");
            Ok(Redirect::to(&otp_error_path(&e.user_message(), email)).into_response())
        }
    }
}

/// Confirmation failed page data.
pub async fn otp_error(Query(query): Query<OtpErrorQuery>) -> Json<OtpErrorQuery> {
    Json(query)
}

/// Send the confirmation email again.
#[instrument(skip_all)]
pub async fn resend_confirmation(
    State(state): State<AppState>,
    Form(form): Form<ResendForm>,
) -> Result<Json<FormRedirect>> {
    let email = Email::parse(&form.email)
        .map_err(|_| FieldErrors::single("email", VALID_EMAIL_REQUIRED))?;

    state
        .identity()
        .resend_signup(&email, &callback_url(&state.config().base_url, &email))
        .await
        .map_err(|e| AppError::on_field(e, "email"))?;

    Ok(Json(FormRedirect::to("/account_confirmation_check_email")))
}

/// Shown after a confirmed sign-up.
pub async fn welcome(OptionalAuth(signed_in): OptionalAuth) -> Json<MessagePage> {
    Json(MessagePage {
        message: "Welcome! Your email is confirmed.",
        user: signed_in.map(|s| s.user),
    })
}

/// Shown while a sign-up waits for its confirmation email.
pub async fn check_email() -> Json<MessagePage> {
    Json(MessagePage {
        message: "Check your email for a confirmation link.",
        user: None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_encodes_email() {
        let email = Email::parse("jane+shop@example.com").unwrap();
        assert_eq!(
            callback_url("https://shop.test", &email),
            "https://shop.test/auth/callback?email=jane%2Bshop%40example.com"
        );
    }

    #[test]
    fn test_otp_error_path() {
        assert_eq!(
            otp_error_path("Link expired", Some("a@b.co")),
            "/otp_error?error=Link+expired&email=a%40b.co"
        );
        assert_eq!(otp_error_path("x", None), "/otp_error?error=x");
    }
}
