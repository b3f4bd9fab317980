//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions)
//! 5. Route gate (redirects for protected and sign-in paths)
//! 6. Rate limiting (governor, per route group)

pub mod auth;
pub mod device;
pub mod rate_limit;
pub mod request_id;
pub mod route_gate;
pub mod session;

pub use auth::{
    OptionalAuth, RequireAuth, ResolvedAuth, clear_auth_tokens, current_session,
    set_auth_tokens, sign_in_session,
};
pub use device::{CurrentCart, device_id};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use route_gate::route_gate;
pub use session::{SESSION_COOKIE_NAME, create_session_layer, postgres_session_store};
