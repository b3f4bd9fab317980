//! Small JSON API used by the sign-up form and the offline banner.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use green_basket_core::Email;
use green_basket_core::validation::VALID_EMAIL_REQUIRED;

use crate::identity::email_registered;
use crate::liveness::BackendStatus;
use crate::state::AppState;

/// Body of `POST /api/auth/check_user`.
#[derive(Debug, Deserialize)]
pub struct CheckUserRequest {
    #[serde(default)]
    pub email: String,
}

/// Whether an account exists for the email.
///
/// Failures are reported in `error` with `exists: false`, never as an HTTP
/// error, so the form can keep going.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckUserResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend liveness for the banner.
#[derive(Debug, Serialize)]
pub struct BackendStatusResponse {
    pub status: BackendStatus,
    pub banner: Option<&'static str>,
}

/// Check whether an email is already registered.
#[instrument(skip_all)]
pub async fn check_user(
    State(state): State<AppState>,
    Json(request): Json<CheckUserRequest>,
) -> Json<CheckUserResponse> {
    let Ok(email) = Email::parse(&request.email) else {
        return Json(CheckUserResponse {
            exists: false,
            error: Some(VALID_EMAIL_REQUIRED.to_owned()),
        });
    };

    let response = match email_registered(state.identity(), &email).await {
        Ok(exists) => CheckUserResponse {
            exists,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "user lookup failed");
            CheckUserResponse {
                exists: false,
                error: Some(e.user_message()),
            }
        }
    };
    Json(response)
}

/// Last known backend status and the banner to show, if any.
pub async fn backend_status(State(state): State<AppState>) -> Json<BackendStatusResponse> {
    let status = state.backend().status();
    Json(BackendStatusResponse {
        status,
        banner: status.banner(),
    })
}
