//! Per-device cart stores for the server.
//!
//! Each browser gets a random device id in its cookie session; the id names
//! its durable slot (`cart:<device-id>`). Stores live in a `moka` cache and
//! are evicted after a period of inactivity; the slot outlives them and is
//! read again on the next visit.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use green_basket_core::DeviceId;

use super::persister::CartPersister;
use super::storage::CartStorage;
use super::store::CartStore;

/// Idle time before an in-memory store is dropped.
const IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

/// Upper bound on resident stores.
const MAX_STORES: u64 = 10_000;

/// Slot key for a device's cart.
#[must_use]
pub fn device_slot(device: &DeviceId) -> String {
    format!("cart:{device}")
}

/// Lazily hydrated cart stores keyed by device id.
#[derive(Clone)]
pub struct CartRegistry {
    stores: Cache<DeviceId, Arc<CartStore>>,
    storage: Arc<dyn CartStorage>,
    persister: CartPersister,
}

impl CartRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn CartStorage>, persister: CartPersister) -> Self {
        Self {
            stores: Cache::builder()
                .max_capacity(MAX_STORES)
                .time_to_idle(IDLE_EVICTION)
                .build(),
            storage,
            persister,
        }
    }

    /// The store for `device`, created and hydrated on first use.
    ///
    /// Concurrent first requests for the same device share one hydration.
    pub async fn get(&self, device: &DeviceId) -> Arc<CartStore> {
        self.stores
            .get_with_by_ref(device, async {
                let store = Arc::new(CartStore::new(device_slot(device), self.persister.clone()));
                store.hydrate(self.storage.as_ref()).await;
                store
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use green_basket_core::{CartLineItem, Price, ProductId};

    use super::*;
    use crate::cart::storage::MemoryCartStorage;

    #[tokio::test]
    async fn test_devices_get_separate_hydrated_stores() {
        let storage = Arc::new(MemoryCartStorage::new());
        let device_a = DeviceId::generate();
        let device_b = DeviceId::generate();
        storage
            .seed(
                &device_slot(&device_a),
                r#"{"state":{"products":[{"id":"p1","name":"Kale","price":450,"quantity":2}]},"version":0}"#,
            )
            .await;

        let (persister, _handle) = CartPersister::spawn(storage.clone());
        let registry = CartRegistry::new(storage, persister);

        let a = registry.get(&device_a).await;
        let b = registry.get(&device_b).await;
        assert_eq!(a.view().await.item_count, 2);
        assert!(b.view().await.hydrated);
        assert!(b.view().await.items.is_empty());

        a.add_product(CartLineItem {
            id: ProductId::parse("p1").unwrap(),
            name: "Kale".to_owned(),
            unit_price: Price::from_minor(450),
            image_url: None,
            quantity: 1,
        })
        .await;
        assert!(Arc::ptr_eq(&a, &registry.get(&device_a).await));
        assert_eq!(registry.get(&device_a).await.view().await.item_count, 3);
    }

    #[test]
    fn test_device_slot_format() {
        let device = DeviceId::parse("abc123").unwrap();
        assert_eq!(device_slot(&device), "cart:abc123");
    }
}
