//! Order records.
//!
//! An order is written once the payments provider redirects back after a
//! successful checkout. It copies the cart lines as they were at that moment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{CartLineItem, CartState};
use crate::types::{OrderId, Price, UserId};

/// An order about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<CartLineItem>,
    pub total: Price,
}

impl NewOrder {
    /// Build an order from a cart.
    ///
    /// Returns `None` until the cart is hydrated, and for an empty cart, so a
    /// reload of the success page never records an empty or stale order.
    #[must_use]
    pub fn from_cart(user_id: UserId, cart: &CartState) -> Option<Self> {
        if !cart.is_hydrated() || cart.is_empty() {
            return None;
        }

        Some(Self {
            user_id,
            items: cart.items().to_vec(),
            total: cart.total(),
        })
    }
}

/// A recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<CartLineItem>,
    pub total: Price,
    pub created_at: DateTime<Utc>,
}

/// Sort orders newest first.
pub fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
