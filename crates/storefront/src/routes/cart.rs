//! Cart route handlers.
//!
//! Each browser's cart lives in a [`crate::cart::CartStore`] named by the
//! device id in its cookie session. Every response is the full cart view.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use green_basket_core::ProductId;

use crate::cart::CartView;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::CurrentCart;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Remove-from-cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub id: ProductId,
}

/// Show the cart.
pub async fn show(CurrentCart(cart): CurrentCart) -> Json<CartView> {
    Json(cart.view().await)
}

/// Add a product, merging with an existing line.
#[instrument(skip(state, cart))]
pub async fn add(
    State(state): State<AppState>,
    CurrentCart(cart): CurrentCart,
    Json(request): Json<AddRequest>,
) -> Result<Json<CartView>> {
    let product = state.catalog().get_product(&request.product_id).await?;
    let item = product.to_line_item(request.quantity).ok_or_else(|| {
        AppError::BadRequest(format!("{} has no fixed price", request.product_id))
    })?;

    add_breadcrumb(
        "cart",
        "Added product",
        Some(&[("product_id", request.product_id.as_str())]),
    );
    Ok(Json(cart.add_product(item).await))
}

/// Remove one unit of a product.
#[instrument(skip(cart))]
pub async fn remove(
    CurrentCart(cart): CurrentCart,
    Json(request): Json<RemoveRequest>,
) -> Json<CartView> {
    Json(cart.remove_product(&request.id).await)
}

/// Empty the cart.
pub async fn clear(CurrentCart(cart): CurrentCart) -> Json<CartView> {
    Json(cart.clear_cart().await)
}
