//! Cart line items, cart state and the persisted cart snapshot.
//!
//! [`CartState`] holds the pure cart logic: merging repeated adds, decrementing
//! on remove and the hydration latch. The storefront crate wraps it with
//! locking and write-through persistence.
//!
//! The snapshot layout matches what a browser `persist` middleware writes:
//!
//! ```json
//! {"state":{"products":[{"id":"p1","name":"Apples","price":500,"quantity":3}]},"version":0}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// Current persisted snapshot version.
pub const SNAPSHOT_VERSION: u32 = 0;

/// One product entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Product id, unique within a cart.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price in minor units.
    #[serde(rename = "price")]
    pub unit_price: Price,
    /// Product image, if any.
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Number of units.
    pub quantity: u32,
}

impl CartLineItem {
    /// Line subtotal (`unit_price * quantity`).
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// In-memory cart contents plus the hydration flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    items: Vec<CartLineItem>,
    hydrated: bool,
}

impl CartState {
    /// Empty, not yet hydrated cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            hydrated: false,
        }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Whether the durable slot has been read.
    #[must_use]
    pub const fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Add a product. A line with the same id gets the incoming quantity added
    /// and keeps its position; anything else is appended.
    ///
    /// Returns `false` (and changes nothing) when `item.quantity` is zero.
    pub fn add_product(&mut self, item: CartLineItem) -> bool {
        if item.quantity == 0 {
            return false;
        }

        match self.items.iter_mut().find(|line| line.id == item.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
        true
    }

    /// Take one unit of `id` out of the cart, dropping the line when it
    /// reaches zero.
    ///
    /// Returns `false` when no line has that id.
    pub fn remove_product(&mut self, id: &ProductId) -> bool {
        let Some(pos) = self.items.iter().position(|line| &line.id == id) else {
            return false;
        };

        let remaining = self
            .items
            .get_mut(pos)
            .map(|line| {
                line.quantity = line.quantity.saturating_sub(1);
                line.quantity
            })
            .unwrap_or_default();

        if remaining == 0 {
            self.items.remove(pos);
        }
        true
    }

    /// Empty the cart. The hydration flag is left alone.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Set the hydration flag. Once set it stays set.
    pub fn set_hydrated(&mut self, hydrated: bool) {
        self.hydrated |= hydrated;
    }

    /// Replace the contents with persisted lines (used while hydrating).
    pub fn replace_items(&mut self, items: Vec<CartLineItem>) {
        self.items = items;
    }

    /// Sum of line subtotals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(CartLineItem::subtotal).sum()
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity held for `id` (zero when absent).
    #[must_use]
    pub fn quantity_of(&self, id: &ProductId) -> u32 {
        self.items
            .iter()
            .find(|line| &line.id == id)
            .map_or(0, |line| line.quantity)
    }

    /// Snapshot of the persistable part of the state.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            state: SnapshotState {
                products: self.items.clone(),
            },
            version: SNAPSHOT_VERSION,
        }
    }
}

/// Persisted form of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    state: SnapshotState,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotState {
    #[serde(default)]
    products: Vec<CartLineItem>,
}

impl CartSnapshot {
    /// Decode a persisted payload.
    ///
    /// Lines with a zero quantity are dropped and repeated ids are folded into
    /// their first occurrence, so the result always satisfies the cart
    /// invariants.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not a cart snapshot.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        let raw: Self = serde_json::from_str(payload)?;

        let mut normalised = CartState::new();
        for line in raw.state.products {
            normalised.add_product(line);
        }

        Ok(Self {
            state: SnapshotState {
                products: normalised.items,
            },
            version: raw.version,
        })
    }

    /// Encode for storage.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Persisted line items.
    #[must_use]
    pub fn products(&self) -> &[CartLineItem] {
        &self.state.products
    }

    /// Consume the snapshot, yielding its line items.
    #[must_use]
    pub fn into_products(self) -> Vec<CartLineItem> {
        self.state.products
    }
}
