//! Checkout route handlers.
//!
//! Checkout hands the cart to the payments provider's hosted page. When the
//! provider redirects back to `/success`, the cart is recorded as an order
//! for the signed-in user and only then emptied.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use green_basket_core::{AuthUser, NewOrder, Order};

use crate::cart::CartView;
use crate::catalog::CheckoutRequest;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{CurrentCart, OptionalAuth, RequireAuth};
use crate::state::AppState;

/// Checkout page data.
#[derive(Debug, Serialize)]
pub struct CheckoutPage {
    pub user: AuthUser,
    pub cart: CartView,
}

/// Success page data.
#[derive(Debug, Serialize)]
pub struct SuccessPage {
    /// The order recorded by this visit, if any.
    pub order: Option<Order>,
    pub cart: CartView,
}

/// Review the cart before paying.
pub async fn show(
    RequireAuth(signed_in): RequireAuth,
    CurrentCart(cart): CurrentCart,
) -> Json<CheckoutPage> {
    Json(CheckoutPage {
        user: signed_in.user,
        cart: cart.view().await,
    })
}

/// Create a hosted checkout session and send the shopper there.
#[instrument(skip_all)]
pub async fn start(
    State(state): State<AppState>,
    RequireAuth(signed_in): RequireAuth,
    CurrentCart(cart): CurrentCart,
) -> Result<Response> {
    let view = cart.view().await;
    if view.items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let base = &state.config().base_url;
    let request = CheckoutRequest {
        items: view.items,
        currency: state.config().stripe.currency.clone(),
        success_url: format!("{base}/success"),
        cancel_url: format!("{base}/checkout"),
        customer_email: signed_in.user.email.clone().map(String::from),
    };

    let session = state.catalog().create_checkout_session(&request).await?;
    add_breadcrumb(
        "checkout",
        "Checkout session created",
        Some(&[("session_id", session.id.as_str())]),
    );
    info!(
        session_id = %session.id,
        user_id = %signed_in.user.id,
        "redirecting to hosted checkout"
    );

    Ok(Redirect::to(&session.url).into_response())
}

/// Return from the hosted checkout.
///
/// A signed-in user with a hydrated, non-empty cart gets an order recorded
/// and the cart is emptied, so a reload records nothing further. Without a
/// user or without items the cart is left as it is.
#[instrument(skip_all)]
pub async fn success(
    State(state): State<AppState>,
    OptionalAuth(signed_in): OptionalAuth,
    CurrentCart(cart): CurrentCart,
) -> Result<Json<SuccessPage>> {
    let contents = cart.state().await;

    let new_order =
        signed_in.and_then(|signed_in| NewOrder::from_cart(signed_in.user.id, &contents));

    match new_order {
        Some(new_order) => {
            let order = state.orders().append(new_order).await?;
            info!(order_id = %order.id, user_id = %order.user_id, "order recorded");
            Ok(Json(SuccessPage {
                order: Some(order),
                cart: cart.clear_cart().await,
            }))
        }
        None => {
            debug!("no order to record; keeping cart");
            Ok(Json(SuccessPage {
                order: None,
                cart: cart.view().await,
            }))
        }
    }
}
