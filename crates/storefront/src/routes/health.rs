//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::liveness::BackendStatus;
use crate::state::AppState;

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// `ok`, `unavailable`, or `disabled` when running without a database.
    pub database: &'static str,
    pub backend: BackendStatus,
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 when the database is not reachable. The identity backend is
/// reported but doesn't affect the status: the shop stays up in degraded
/// mode while it is paused.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = match state.pool() {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => "ok",
            Err(e) => {
                tracing::warn!(error = %e, "readiness database ping failed");
                "unavailable"
            }
        },
        None => "disabled",
    };

    let status = if database == "unavailable" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(Readiness {
            database,
            backend: state.backend().status(),
        }),
    )
}
