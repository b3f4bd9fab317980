//! Per-browser device id and cart lookup.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use green_basket_core::DeviceId;

use crate::cart::CartStore;
use crate::error::AppError;
use crate::models::session_keys;
use crate::state::AppState;

/// The device id in the session, generating one on first use.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn device_id(session: &Session) -> Result<DeviceId, tower_sessions::session::Error> {
    if let Some(id) = session.get::<DeviceId>(session_keys::DEVICE_ID).await? {
        return Ok(id);
    }

    let id = DeviceId::generate();
    session.insert(session_keys::DEVICE_ID, &id).await?;
    Ok(id)
}

/// Extractor for this browser's hydrated cart store.
pub struct CurrentCart(pub Arc<CartStore>);

impl FromRequestParts<AppState> for CurrentCart {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let device = device_id(session).await?;
        Ok(Self(state.carts().get(&device).await))
    }
}
