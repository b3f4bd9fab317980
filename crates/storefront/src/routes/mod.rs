//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Database ping + backend status
//!
//! # Catalog
//! GET  /products                        - Product list
//! GET  /products/{id}                   - Product detail
//! GET  /categories                      - Category names
//! GET  /categories/{category}           - Products in a category
//! GET  /search?query=                   - Product search
//!
//! # Cart
//! GET  /cart                            - Cart view
//! POST /cart/add                        - Add product {product_id, quantity?}
//! POST /cart/remove                     - Remove one unit {id}
//! POST /cart/clear                      - Empty the cart
//!
//! # Checkout (requires auth)
//! GET  /checkout                        - Review cart
//! POST /checkout                        - Redirect to hosted checkout
//! GET  /success                         - Record order, clear cart
//!
//! # Auth
//! GET  /login                           - Sign-in page (signed-in users bounce)
//! POST /login                           - Sign in (form)
//! GET  /register                        - Sign-up page (signed-in users bounce)
//! POST /register                        - Create account (form)
//! POST /logout                          - Sign out
//! GET  /auth/callback                   - Confirmation link landing
//! GET  /otp_error                       - Confirmation failure details
//! POST /otp_error/resend                - Resend confirmation email
//! GET  /welcome_new_user                - After confirmation
//! GET  /account_confirmation_check_email - After registration
//!
//! # Account (requires auth)
//! GET  /dashboard                       - User and order history
//! GET  /profile                         - User details
//! POST /profile/delete                  - Delete account
//! POST /change_password                 - Change password (form)
//!
//! # API
//! POST /api/auth/check_user             - Does an account exist for {email}
//! GET  /api/backend-status              - Liveness banner
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod health;

use axum::{
    Router,
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, request_id_middleware, route_gate,
};
use crate::state::AppState;

/// Successful form submission: where the client should go next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormRedirect {
    pub redirect_to: String,
}

impl FormRedirect {
    #[must_use]
    pub fn to(path: &str) -> Self {
        Self {
            redirect_to: path.to_owned(),
        }
    }
}

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::index))
        .route("/products/{id}", get(catalog::show))
        .route("/categories", get(catalog::categories))
        .route("/categories/{category}", get(catalog::category))
        .route("/search", get(catalog::search))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .layer(api_rate_limiter())
}

/// Create the rate-limited auth form routes router.
pub fn auth_form_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/change_password", post(account::change_password))
        .route("/otp_error/resend", post(auth::resend_confirmation))
        .route("/api/auth/check_user", post(api::check_user))
        .layer(auth_rate_limiter())
}

/// Create the remaining auth and account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/auth/callback", get(auth::callback))
        .route("/otp_error", get(auth::otp_error))
        .route("/welcome_new_user", get(auth::welcome))
        .route("/account_confirmation_check_email", get(auth::check_email))
        .route("/dashboard", get(account::dashboard))
        .route("/profile", get(account::profile))
        .route("/profile/delete", post(account::delete))
        .route("/checkout", get(checkout::show).post(checkout::start))
        .route("/success", get(checkout::success))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(catalog_routes())
        .nest("/cart", cart_routes())
        .merge(auth_form_routes())
        .merge(account_routes())
        .route("/api/backend-status", get(api::backend_status))
        .fallback(|| async { AppError::NotFound("page".to_string()) })
}

/// The complete application: routes, route gate, sessions, tracing, Sentry.
///
/// `session_layer` decides where sessions live (`PostgreSQL` in production,
/// memory in tests).
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(routes())
        .layer(from_fn_with_state(state.clone(), route_gate))
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
