//! Runtime cart store: [`CartState`] behind a lock, mirrored to durable storage.

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use green_basket_core::{CartLineItem, CartSnapshot, CartState, Price, ProductId};

use super::persister::CartPersister;
use super::storage::CartStorage;

/// Serializable view of a cart, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineItem>,
    pub total: Price,
    pub item_count: u64,
    pub hydrated: bool,
}

impl From<&CartState> for CartView {
    fn from(state: &CartState) -> Self {
        Self {
            items: state.items().to_vec(),
            total: state.total(),
            item_count: state.item_count(),
            hydrated: state.is_hydrated(),
        }
    }
}

/// One cart bound to one durable slot.
///
/// Every mutation holds the lock for its whole read-modify-write, then
/// schedules a write-through of the resulting snapshot.
#[derive(Debug)]
pub struct CartStore {
    slot: String,
    state: Mutex<CartState>,
    persister: CartPersister,
}

impl CartStore {
    /// Empty, unhydrated cart for `slot`.
    #[must_use]
    pub fn new(slot: impl Into<String>, persister: CartPersister) -> Self {
        Self {
            slot: slot.into(),
            state: Mutex::new(CartState::new()),
            persister,
        }
    }

    /// Read the durable slot once and mark the store hydrated.
    ///
    /// Persisted lines replace whatever is in memory. Read or decode failures
    /// are logged; the store is marked hydrated either way so callers are
    /// never stuck waiting. Later calls do nothing.
    pub async fn hydrate(&self, storage: &dyn CartStorage) {
        let mut state = self.state.lock().await;
        if state.is_hydrated() {
            return;
        }

        match storage.load(&self.slot).await {
            Ok(Some(payload)) => match CartSnapshot::from_json(&payload) {
                Ok(snapshot) => {
                    state.replace_items(snapshot.into_products());
                    debug!(slot = %self.slot, items = state.items().len(), "cart hydrated");
                }
                Err(e) => warn!(slot = %self.slot, error = %e, "discarding unreadable cart snapshot"),
            },
            Ok(None) => debug!(slot = %self.slot, "no stored cart"),
            Err(e) => warn!(slot = %self.slot, error = %e, "failed to read cart slot"),
        }

        state.set_hydrated(true);
    }

    /// Add a product (merging into an existing line with the same id).
    pub async fn add_product(&self, item: CartLineItem) -> CartView {
        let mut state = self.state.lock().await;
        if state.add_product(item) {
            self.persister.enqueue(&self.slot, &state.snapshot());
        }
        CartView::from(&*state)
    }

    /// Take one unit of `id` out of the cart.
    pub async fn remove_product(&self, id: &ProductId) -> CartView {
        let mut state = self.state.lock().await;
        if state.remove_product(id) {
            self.persister.enqueue(&self.slot, &state.snapshot());
        }
        CartView::from(&*state)
    }

    /// Empty the cart.
    pub async fn clear_cart(&self) -> CartView {
        let mut state = self.state.lock().await;
        state.clear();
        self.persister.enqueue(&self.slot, &state.snapshot());
        CartView::from(&*state)
    }

    /// Set the hydration flag (latched once true).
    pub async fn set_hydrated(&self, hydrated: bool) {
        self.state.lock().await.set_hydrated(hydrated);
    }

    pub async fn is_hydrated(&self) -> bool {
        self.state.lock().await.is_hydrated()
    }

    /// Current contents.
    pub async fn view(&self) -> CartView {
        CartView::from(&*self.state.lock().await)
    }

    /// Copy of the underlying state.
    pub async fn state(&self) -> CartState {
        self.state.lock().await.clone()
    }
}
